mod common;

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use common::*;
use proptest::prelude::*;
use sample_lifecycle::clients::CollectionDetails;
use sample_lifecycle::models::{MasterTest, TestStatus};
use sample_lifecycle::planner::plan_collections;
use sample_lifecycle::state_machine::{can_transition, determine_target_state};
use sample_lifecycle::{
    LabId, MasterTestId, SampleEvent, SampleStatus, TestDetail, VialTypeId,
};

fn any_status() -> impl Strategy<Value = SampleStatus> {
    prop::sample::select(SampleStatus::ALL.to_vec())
}

fn any_event() -> impl Strategy<Value = SampleEvent> {
    prop_oneof![
        Just(SampleEvent::MarkCollected { collected_at: None }),
        Just(SampleEvent::ForceCollected {
            collected_at: Some(Utc::now())
        }),
        Just(SampleEvent::MarkNotCollectedEmedic),
        Just(SampleEvent::Receive),
        Just(SampleEvent::Accession),
        "[A-Z]{3}-[0-9]{1,4}".prop_map(|visit_id| SampleEvent::SyncToLis { visit_id }),
        Just(SampleEvent::ResetLisSync),
        (1i64..50).prop_map(|id| SampleEvent::Outsource {
            next_destination: LabId(id)
        }),
        Just(SampleEvent::Transfer),
        Just(SampleEvent::Dispatch),
        Just(SampleEvent::FailTransfer),
        (1i64..50).prop_map(|id| SampleEvent::Reject {
            reason: "clotted".to_string(),
            rejecting_lab: LabId(id)
        }),
        (1i64..50).prop_map(|id| SampleEvent::PartiallyReject {
            reason: "clotted".to_string(),
            rejecting_lab: LabId(id)
        }),
        Just(SampleEvent::PromoteToRejected),
        Just(SampleEvent::MarkNotReceived {
            reason: "missing".to_string()
        }),
        Just(SampleEvent::Delete),
    ]
}

/// Master test id, collections count, processing lab and vials per test
fn any_catalogue() -> impl Strategy<Value = Vec<(i64, u32, i64, Vec<i64>)>> {
    prop::collection::vec(
        (0u32..4, 1i64..4, prop::collection::btree_set(1i64..4, 1..3)),
        1..8,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (count, lab, vials))| (i as i64 + 1, count, lab, vials.into_iter().collect()))
            .collect()
    })
}

proptest! {
    #[test]
    fn transitions_stay_inside_the_status_set(status in any_status(), event in any_event()) {
        match determine_target_state(status, &event) {
            Ok(target) => {
                prop_assert!(SampleStatus::ALL.contains(&target));
                prop_assert!(can_transition(status, &event));
            }
            Err(_) => prop_assert!(!can_transition(status, &event)),
        }
    }

    #[test]
    fn deleted_samples_never_move(event in any_event()) {
        prop_assert!(determine_target_state(SampleStatus::Deleted, &event).is_err());
    }

    #[test]
    fn rejected_samples_cannot_be_rejected_again(event in any_event()) {
        if matches!(event, SampleEvent::Reject { .. } | SampleEvent::PartiallyReject { .. }) {
            prop_assert!(determine_target_state(SampleStatus::Rejected, &event).is_err());
        }
    }

    #[test]
    fn every_test_gets_one_draw_per_vial_and_collection(catalogue in any_catalogue()) {
        let tests: Vec<TestDetail> = catalogue
            .iter()
            .map(|(master, _, lab, _)| TestDetail {
                id: 0,
                oms_order_id: "O1".to_string(),
                oms_test_id: format!("T{master}"),
                test_name: format!("T{master}"),
                city_code: "BLR".to_string(),
                task_id: None,
                lab_id: LabId(*lab),
                processing_lab_id: LabId(*lab),
                master_test_id: MasterTestId(*master),
                status: TestStatus::Requested,
                lab_eta: None,
                lab_tat: None,
            })
            .collect();
        let sequences = vec![CollectionDetails {
            sequence: 1,
            master_test_ids: catalogue.iter().map(|(m, ..)| MasterTestId(*m)).collect(),
            test_vial_mapping: catalogue
                .iter()
                .map(|(m, _, _, vials)| (MasterTestId(*m), vials.iter().map(|v| VialTypeId(*v)).collect()))
                .collect(),
        }];
        let masters: HashMap<MasterTestId, MasterTest> = catalogue
            .iter()
            .map(|(m, count, ..)| {
                (
                    MasterTestId(*m),
                    MasterTest {
                        id: MasterTestId(*m),
                        name: format!("M{m}"),
                        collections_count: *count,
                        test_lab_meta: HashMap::new(),
                    },
                )
            })
            .collect();

        let planned = plan_collections(&tests, &sequences, &masters);

        let labs: HashMap<String, LabId> = tests
            .iter()
            .map(|t| (t.oms_test_id.clone(), t.processing_lab_id))
            .collect();
        for collection in &planned {
            prop_assert!(!collection.oms_test_ids.is_empty());
            for id in &collection.oms_test_ids {
                prop_assert_eq!(labs[id], collection.processing_lab_id);
            }
        }
        for (master, count, _, vials) in &catalogue {
            let id = format!("T{master}");
            let draws = planned.iter().filter(|c| c.oms_test_ids.contains(&id)).count();
            prop_assert_eq!(draws, vials.len() * (*count).max(1) as usize);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn planned_sample_numbers_are_unique_and_dense(
        picks in prop::collection::vec((0usize..4, prop::bool::ANY), 1..8)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let numbers = runtime.block_on(async {
            let world = TestWorld::new();
            OrderBuilder::new("O1").insert(&world);
            let masters = [MASTER_CBC, MASTER_ESR, MASTER_LIPID, MASTER_GTT];
            for (i, (master, at_sister)) in picks.iter().enumerate() {
                let builder = TestBuilder::new("O1", &format!("T{i}"), masters[*master]);
                let builder = if *at_sister {
                    builder.processing_lab(LAB_SISTER)
                } else {
                    builder
                };
                builder.insert(&world);
            }
            world
                .planner()
                .create_samples_for_order("O1", None)
                .await
                .unwrap();
            world
                .root_samples("O1")
                .iter()
                .map(|r| r.sample.sample_number)
                .collect::<Vec<i32>>()
        });

        let unique: HashSet<i32> = numbers.iter().copied().collect();
        prop_assert_eq!(unique.len(), numbers.len());
        let expected: Vec<i32> = (1..=numbers.len() as i32).collect();
        prop_assert_eq!(numbers, expected);
    }
}
