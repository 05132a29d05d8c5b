//! Where each received sample goes next.
//!
//! The route of a sample number is the processing lab of its mapped tests. When the
//! tests disagree the session lab wins: once a mapping resolves to the receiving lab the
//! sample stays in-house.

use std::collections::{BTreeMap, BTreeSet};

use crate::lookups::TestsWithMappings;
use crate::models::{LabDirectory, LabId, LabType, SampleRecord, TestDetail};

/// Processing lab per sample number, biased towards `session_lab_id`
pub fn sample_number_routes(
    tests: &TestsWithMappings,
    session_lab_id: LabId,
) -> BTreeMap<i32, LabId> {
    let mut routes: BTreeMap<i32, LabId> = BTreeMap::new();
    for mapping in tests.mappings.iter().filter(|m| m.is_active()) {
        let Some(test) = tests.test(&mapping.oms_test_id) else {
            continue;
        };
        let lab_id = test.processing_lab_id;
        routes
            .entry(mapping.sample_number)
            .and_modify(|current| {
                if *current != session_lab_id {
                    *current = lab_id;
                }
            })
            .or_insert(lab_id);
    }
    routes
}

/// Samples of one order bucketed by lab type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutedSamples {
    pub inhouse: Vec<SampleRecord>,
    pub outsource: Vec<SampleRecord>,
    pub interlab: Vec<SampleRecord>,
    /// No mapped test, so no lab to route to
    pub unrouted: Vec<SampleRecord>,
}

impl RoutedSamples {
    pub fn len(&self) -> usize {
        self.inhouse.len() + self.outsource.len() + self.interlab.len() + self.unrouted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_routable(&self) -> bool {
        !(self.inhouse.is_empty() && self.outsource.is_empty() && self.interlab.is_empty())
    }
}

pub fn classify(
    samples: Vec<SampleRecord>,
    routes: &BTreeMap<i32, LabId>,
    labs: &LabDirectory,
    session_lab_id: LabId,
) -> RoutedSamples {
    let mut routed = RoutedSamples::default();
    for record in samples {
        match routes.get(&record.sample.sample_number) {
            None => routed.unrouted.push(record),
            Some(&lab_id) => match labs.lab_type(lab_id, session_lab_id) {
                LabType::Inhouse => routed.inhouse.push(record),
                LabType::Interlab => routed.interlab.push(record),
                LabType::Outsource => routed.outsource.push(record),
            },
        }
    }
    routed
}

/// Tests mapped to any of `samples`' numbers, each once, in mapping order
pub fn tests_for_samples<'a>(
    tests: &'a TestsWithMappings,
    samples: &[SampleRecord],
) -> Vec<&'a TestDetail> {
    let numbers: BTreeSet<i32> = samples.iter().map(|s| s.sample.sample_number).collect();
    let mut seen = BTreeSet::new();
    tests
        .mappings
        .iter()
        .filter(|m| m.is_active() && numbers.contains(&m.sample_number))
        .filter_map(|m| tests.test(&m.oms_test_id))
        .filter(|t| seen.insert(t.oms_test_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Lab, MasterTestId, SampleId, SampleMetadata, TestSampleMapping, TestStatus, UserId,
        VialTypeId, NewSample,
    };
    use crate::state_machine::SampleStatus;
    use chrono::Utc;

    fn test_detail(id: &str, lab: i64) -> TestDetail {
        TestDetail {
            id: 0,
            oms_order_id: "O1".to_string(),
            oms_test_id: id.to_string(),
            test_name: id.to_string(),
            city_code: "BLR".to_string(),
            task_id: None,
            lab_id: LabId(1),
            processing_lab_id: LabId(lab),
            master_test_id: MasterTestId(1),
            status: TestStatus::Requested,
            lab_eta: None,
            lab_tat: None,
        }
    }

    fn mapping(test: &str, number: i32) -> TestSampleMapping {
        TestSampleMapping {
            id: 0,
            oms_order_id: "O1".to_string(),
            city_code: "BLR".to_string(),
            oms_test_id: test.to_string(),
            vial_type_id: VialTypeId(5),
            sample_id: SampleId(number as i64),
            sample_number: number,
            recollection_pending: false,
            is_rejected: false,
            rejection_reason: None,
            deleted_at: None,
        }
    }

    fn sample(number: i32) -> SampleRecord {
        let sample = NewSample {
            oms_order_id: "O1".to_string(),
            oms_request_id: "R1".to_string(),
            city_code: "BLR".to_string(),
            vial_type_id: VialTypeId(5),
            parent_sample_id: None,
            lab_id: None,
            destination_lab_id: LabId(1),
            status: SampleStatus::Received,
            barcode: None,
            visit_id: None,
            created_by: UserId(1),
        }
        .into_sample(SampleId(number as i64), number, Utc::now());
        SampleRecord::new(sample, SampleMetadata::for_order("O1", "BLR", 1))
    }

    fn labs() -> LabDirectory {
        LabDirectory::new(vec![
            Lab {
                id: LabId(1),
                name: "Central".to_string(),
                inhouse: true,
            },
            Lab {
                id: LabId(2),
                name: "North".to_string(),
                inhouse: true,
            },
            Lab {
                id: LabId(3),
                name: "Partner".to_string(),
                inhouse: false,
            },
        ])
    }

    #[test]
    fn test_session_lab_wins_regardless_of_mapping_order() {
        let session = LabId(1);
        for order in [["A", "B"], ["B", "A"]] {
            let tests = TestsWithMappings {
                tests: vec![test_detail("A", 1), test_detail("B", 2)],
                mappings: order.iter().map(|t| mapping(t, 1)).collect(),
            };
            let routes = sample_number_routes(&tests, session);
            assert_eq!(routes.get(&1), Some(&session));

            let routed = classify(vec![sample(1)], &routes, &labs(), session);
            assert_eq!(routed.inhouse.len(), 1);
            assert!(routed.interlab.is_empty());
        }
    }

    #[test]
    fn test_classification_buckets() {
        let tests = TestsWithMappings {
            tests: vec![test_detail("A", 2), test_detail("B", 3)],
            mappings: vec![mapping("A", 1), mapping("B", 2)],
        };
        let routes = sample_number_routes(&tests, LabId(1));
        let routed = classify(vec![sample(1), sample(2), sample(3)], &routes, &labs(), LabId(1));

        assert_eq!(routed.interlab[0].sample.sample_number, 1);
        assert_eq!(routed.outsource[0].sample.sample_number, 2);
        assert_eq!(routed.unrouted[0].sample.sample_number, 3);
        assert_eq!(routed.len(), 3);
        assert!(routed.has_routable());
    }

    #[test]
    fn test_tests_for_samples_deduplicates() {
        let tests = TestsWithMappings {
            tests: vec![test_detail("A", 2), test_detail("B", 2)],
            mappings: vec![mapping("A", 1), mapping("A", 2), mapping("B", 3)],
        };
        let found = tests_for_samples(&tests, &[sample(1), sample(2)]);
        let ids: Vec<_> = found.iter().map(|t| t.oms_test_id.as_str()).collect();
        assert_eq!(ids, vec!["A"]);
    }
}
