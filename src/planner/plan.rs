//! Pure expansion of collection sequences into draws.
//!
//! A sequence maps each master test to the vials it needs. Within a sequence the tests
//! are grouped per processing lab, then per vial. One group yields as many draws as the
//! largest collections count among its tests; draw `i` carries the tests that need more
//! than `i` collections.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::clients::CollectionDetails;
use crate::models::{LabId, MasterTest, MasterTestId, TestDetail, VialTypeId};

/// One physical sample to create and the tests it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCollection {
    pub sequence: i32,
    pub vial_type_id: VialTypeId,
    pub processing_lab_id: LabId,
    pub oms_test_ids: Vec<String>,
}

/// De-duplicated, ascending master test ids of `tests`
pub fn ordered_master_test_ids(tests: &[TestDetail]) -> Vec<MasterTestId> {
    tests
        .iter()
        .map(|t| t.master_test_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn plan_collections(
    tests: &[TestDetail],
    sequences: &[CollectionDetails],
    master_tests: &HashMap<MasterTestId, MasterTest>,
) -> Vec<PlannedCollection> {
    let mut processing_labs: HashMap<MasterTestId, LabId> = HashMap::new();
    let mut oms_tests: HashMap<MasterTestId, Vec<&str>> = HashMap::new();
    for test in tests {
        processing_labs.insert(test.master_test_id, test.processing_lab_id);
        oms_tests
            .entry(test.master_test_id)
            .or_default()
            .push(test.oms_test_id.as_str());
    }

    let collections_count = |id: &MasterTestId| {
        master_tests
            .get(id)
            .map(MasterTest::effective_collections_count)
            .unwrap_or(1)
    };

    let mut planned = Vec::new();
    for details in sequences {
        let mut by_lab: BTreeMap<LabId, BTreeMap<VialTypeId, Vec<MasterTestId>>> = BTreeMap::new();
        for master_test_id in &details.master_test_ids {
            let lab_id = processing_labs
                .get(master_test_id)
                .copied()
                .unwrap_or_default();
            let vials = details
                .test_vial_mapping
                .get(master_test_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for vial_type_id in vials {
                by_lab
                    .entry(lab_id)
                    .or_default()
                    .entry(*vial_type_id)
                    .or_default()
                    .push(*master_test_id);
            }
        }

        for (lab_id, vials) in by_lab {
            for (vial_type_id, master_test_ids) in vials {
                let draws = master_test_ids
                    .iter()
                    .map(collections_count)
                    .max()
                    .unwrap_or(1);
                for draw in 0..draws {
                    let oms_test_ids: Vec<String> = master_test_ids
                        .iter()
                        .filter(|id| collections_count(id) > draw)
                        .flat_map(|id| oms_tests.get(id).into_iter().flatten())
                        .map(|id| id.to_string())
                        .collect();
                    if oms_test_ids.is_empty() {
                        continue;
                    }
                    planned.push(PlannedCollection {
                        sequence: details.sequence,
                        vial_type_id,
                        processing_lab_id: lab_id,
                        oms_test_ids,
                    });
                }
            }
        }
    }
    planned
}
