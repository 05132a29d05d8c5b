//! Collection-sequence planning service.
//!
//! Given an order's master tests, the service answers which tests can share a draw
//! (`sequence`) and which vial types each test needs.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SampleError};
use crate::models::{MasterTestId, VialTypeId};

pub const COLLECTION_SEQUENCE_SERVICE: &str = "collection_sequence";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSequenceRequest {
    pub city_code: String,
    pub oms_order_id: String,
    /// De-duplicated and ascending
    pub master_test_ids: Vec<MasterTestId>,
}

/// One draw: the tests collected together and the vials each of them needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDetails {
    pub sequence: i32,
    pub master_test_ids: Vec<MasterTestId>,
    pub test_vial_mapping: HashMap<MasterTestId, Vec<VialTypeId>>,
}

#[async_trait]
pub trait CollectionSequenceClient: Send + Sync {
    async fn get_collection_sequence(
        &self,
        request: CollectionSequenceRequest,
    ) -> Result<Vec<CollectionDetails>>;
}

/// Answers from a fixed `test -> (sequence, vials)` table
#[derive(Debug, Default)]
pub struct StaticCollectionSequence {
    tests: RwLock<HashMap<MasterTestId, (i32, Vec<VialTypeId>)>>,
}

impl StaticCollectionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, master_test_id: MasterTestId, sequence: i32, vials: Vec<VialTypeId>) {
        self.tests.write().insert(master_test_id, (sequence, vials));
    }
}

#[async_trait]
impl CollectionSequenceClient for StaticCollectionSequence {
    async fn get_collection_sequence(
        &self,
        request: CollectionSequenceRequest,
    ) -> Result<Vec<CollectionDetails>> {
        let tests = self.tests.read();
        let mut sequences: Vec<CollectionDetails> = Vec::new();
        for master_test_id in &request.master_test_ids {
            let (sequence, vials) = tests.get(master_test_id).ok_or_else(|| {
                SampleError::upstream(
                    COLLECTION_SEQUENCE_SERVICE,
                    format!("no collection plan for master test {master_test_id}"),
                )
            })?;
            let position = match sequences.iter().position(|c| c.sequence == *sequence) {
                Some(position) => position,
                None => {
                    sequences.push(CollectionDetails {
                        sequence: *sequence,
                        master_test_ids: Vec::new(),
                        test_vial_mapping: HashMap::new(),
                    });
                    sequences.len() - 1
                }
            };
            let details = &mut sequences[position];
            details.master_test_ids.push(*master_test_id);
            details.test_vial_mapping.insert(*master_test_id, vials.clone());
        }
        sequences.sort_by_key(|c| c.sequence);
        Ok(sequences)
    }
}
