//! Master-data cache: test catalogue, lab directory and vial types.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Lab, LabDirectory, MasterTest, MasterTestId, VialTypeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VialType {
    pub id: VialTypeId,
    pub name: String,
}

#[async_trait]
pub trait MasterDataCache: Send + Sync {
    /// Unknown ids are absent from the result
    async fn get_master_tests_by_ids(
        &self,
        ids: &[MasterTestId],
    ) -> Result<HashMap<MasterTestId, MasterTest>>;

    async fn get_lab_directory(&self) -> Result<LabDirectory>;

    async fn get_vial_types(&self) -> Result<HashMap<VialTypeId, VialType>>;
}

/// Cache preloaded in process
#[derive(Debug, Default)]
pub struct InMemoryMasterData {
    tests: RwLock<HashMap<MasterTestId, MasterTest>>,
    labs: RwLock<Vec<Lab>>,
    vials: RwLock<HashMap<VialTypeId, VialType>>,
}

impl InMemoryMasterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_master_test(&self, test: MasterTest) {
        self.tests.write().insert(test.id, test);
    }

    pub fn add_lab(&self, lab: Lab) {
        let mut labs = self.labs.write();
        labs.retain(|existing| existing.id != lab.id);
        labs.push(lab);
    }

    pub fn add_vial_type(&self, vial: VialType) {
        self.vials.write().insert(vial.id, vial);
    }
}

#[async_trait]
impl MasterDataCache for InMemoryMasterData {
    async fn get_master_tests_by_ids(
        &self,
        ids: &[MasterTestId],
    ) -> Result<HashMap<MasterTestId, MasterTest>> {
        let tests = self.tests.read();
        Ok(ids
            .iter()
            .filter_map(|id| tests.get(id).map(|t| (*id, t.clone())))
            .collect())
    }

    async fn get_lab_directory(&self) -> Result<LabDirectory> {
        Ok(LabDirectory::new(self.labs.read().iter().cloned()))
    }

    async fn get_vial_types(&self) -> Result<HashMap<VialTypeId, VialType>> {
        Ok(self.vials.read().clone())
    }
}
