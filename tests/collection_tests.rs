mod common;

use std::time::Duration;

use common::*;
use sample_lifecycle::constants::{messages, COLLECT_LATER_REQUESTED_REASON};
use sample_lifecycle::lookups::TestLookup;
use sample_lifecycle::models::TestStatus;
use sample_lifecycle::samples::{
    Accession, AddBarcodesRequest, ForceCollectedRequest, MarkCollectedRequest, TaskType,
    UpdateTaskSequenceRequest,
};
use sample_lifecycle::{SampleError, SampleLifecycleEvent, SampleStatus};

async fn planned_order(world: &TestWorld, oms_order_id: &str) {
    OrderBuilder::new(oms_order_id).insert(world);
    TestBuilder::new(oms_order_id, "T1", MASTER_CBC).insert(world);
    TestBuilder::new(oms_order_id, "T2", MASTER_ESR).insert(world);
    TestBuilder::new(oms_order_id, "T3", MASTER_LIPID).insert(world);
    world
        .planner()
        .create_samples_for_order(oms_order_id, None)
        .await
        .unwrap();
}

async fn test_status(world: &TestWorld, oms_order_id: &str, oms_test_id: &str) -> TestStatus {
    world
        .store
        .get_tests_by_order(oms_order_id)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.oms_test_id == oms_test_id)
        .unwrap()
        .status
}

fn primary(oms_request_id: &str) -> MarkCollectedRequest {
    MarkCollectedRequest {
        oms_request_id: oms_request_id.to_string(),
        task_type: TaskType::Primary,
        task_sequence: None,
        collected_at: None,
    }
}

#[tokio::test]
async fn test_barcodes_and_collect_later_reasons_set_test_status() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let roots = world.root_samples("O1");

    let later = Accession {
        sample_id: roots[1].id(),
        collect_later_reason: "Patient unavailable".to_string(),
        ..Accession::default()
    };
    let statuses = world
        .samples()
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![scanned(&roots[0], "BC1"), later],
        })
        .await
        .unwrap();

    assert_eq!(statuses["T1"], TestStatus::Requested);
    assert_eq!(statuses["T2"], TestStatus::Requested);
    assert_eq!(statuses["T3"], TestStatus::CollectSampleLater);
    assert_eq!(test_status(&world, "O1", "T3").await, TestStatus::CollectSampleLater);

    let roots = world.root_samples("O1");
    assert_eq!(roots[0].sample.barcode.as_deref(), Some("BC1"));
    assert!(roots[0].metadata.barcode_scanned_at.is_some());
    assert_eq!(
        roots[1].metadata.collect_later_reason.as_deref(),
        Some("Patient unavailable")
    );
    assert_eq!(roots[1].sample.barcode, None);
}

#[tokio::test]
async fn test_requested_collect_later_reason_keeps_test_requested() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let roots = world.root_samples("O1");

    let statuses = world
        .samples()
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![Accession {
                sample_id: roots[1].id(),
                collect_later_reason: COLLECT_LATER_REQUESTED_REASON.to_string(),
                ..Accession::default()
            }],
        })
        .await
        .unwrap();
    assert_eq!(statuses["T3"], TestStatus::Requested);
}

#[tokio::test]
async fn test_barcode_held_by_another_order_is_rejected() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    planned_order(&world, "O2").await;
    let first = world.root_samples("O1");
    let second = world.root_samples("O2");
    let service = world.samples();

    service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![scanned(&first[0], "BC1")],
        })
        .await
        .unwrap();

    // Re-sending the same barcode for the same sample is fine
    service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![scanned(&first[0], "BC1")],
        })
        .await
        .unwrap();

    let err = service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![scanned(&second[0], "BC1")],
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::conflict(messages::DUPLICATE_BARCODE));
    assert_eq!(world.root_samples("O2")[0].sample.barcode, None);

    let err = service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![scanned(&second[0], "BC2"), scanned(&second[1], "BC2")],
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::conflict(messages::DUPLICATE_BARCODE));
}

#[tokio::test]
async fn test_barcode_request_validation() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let roots = world.root_samples("O1");
    let service = world.samples();

    let err = service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![Accession {
                sample_id: roots[0].id(),
                ..Accession::default()
            }],
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::validation(messages::BARCODE_OR_REASON_REQUIRED));

    let mut no_image = scanned(&roots[0], "BC1");
    no_image.barcode_image_url = String::new();
    let err = service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![no_image],
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::validation(messages::BARCODE_IMAGE_REQUIRED));

    let mut unknown = scanned(&roots[0], "BC1");
    unknown.sample_id = sample_lifecycle::SampleId(9_999);
    let err = service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![unknown],
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::not_found(messages::SAMPLES_NOT_FOUND));
}

#[tokio::test]
async fn test_primary_task_marks_every_sample_collected() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let mut events = world.events.subscribe();

    let collected = world
        .samples()
        .mark_samples_collected(primary("R-O1"))
        .await
        .unwrap();
    assert_eq!(collected.len(), 2);

    for record in world.root_samples("O1") {
        assert_eq!(record.sample.status, SampleStatus::CollectionDone);
        assert!(record.metadata.collected_at.is_some());
    }
    assert!(world.samples().is_sample_collected("O1").await.unwrap());

    let published = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event should be published")
        .unwrap();
    match published.event {
        SampleLifecycleEvent::SampleCollected {
            oms_order_id,
            oms_test_ids,
            collected_at,
        } => {
            assert_eq!(oms_order_id, "O1");
            assert_eq!(oms_test_ids, vec!["T1", "T2", "T3"]);
            assert!(collected_at.is_some());
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_collection_task_validation_and_empty_selection() {
    let world = TestWorld::new();
    let service = world.samples();

    let err = service.mark_samples_collected(primary(" ")).await.unwrap_err();
    assert_eq!(err, SampleError::validation(messages::REQUEST_ID_REQUIRED));

    let err = service
        .mark_samples_collected(MarkCollectedRequest {
            task_type: TaskType::Recollection,
            ..primary("R-O1")
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::validation(messages::TASK_ID_REQUIRED));

    let err = service
        .mark_samples_collected(primary("R-UNKNOWN"))
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::not_found(messages::NO_SAMPLES_TO_COLLECT));
    assert!(!service.is_sample_collected("O1").await.unwrap());
}

#[tokio::test]
async fn test_recollection_task_only_collects_its_samples() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let service = world.samples();
    service.mark_samples_collected(primary("R-O1")).await.unwrap();

    world
        .planner()
        .create_samples_for_recollection("O1", &["T3".to_string()], Some(9))
        .await
        .unwrap();

    let err = service
        .mark_samples_collected(MarkCollectedRequest {
            task_type: TaskType::Recollection,
            task_sequence: Some(8),
            ..primary("R-O1")
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::not_found(messages::NO_SAMPLES_TO_COLLECT));

    let collected = service
        .mark_samples_collected(MarkCollectedRequest {
            task_type: TaskType::Recollection,
            task_sequence: Some(9),
            ..primary("R-O1")
        })
        .await
        .unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].sample.sample_number, 3);
}

#[tokio::test]
async fn test_collected_at_survives_repeat_confirmation() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let service = world.samples();

    service.mark_samples_collected(primary("R-O1")).await.unwrap();
    let first = world.root_samples("O1")[0].metadata.collected_at;
    service.mark_samples_collected(primary("R-O1")).await.unwrap();

    assert_eq!(world.root_samples("O1")[0].metadata.collected_at, first);
}

#[tokio::test]
async fn test_force_collected_clears_collect_later() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let roots = world.root_samples("O1");
    let service = world.samples();
    service
        .add_barcode_details(AddBarcodesRequest {
            accessions: vec![Accession {
                sample_id: roots[1].id(),
                collect_later_reason: "Patient unavailable".to_string(),
                ..Accession::default()
            }],
        })
        .await
        .unwrap();

    let forced = service
        .force_mark_collected(ForceCollectedRequest {
            oms_order_id: "O1".to_string(),
            sample_numbers: vec![2],
            collected_at: None,
            user_id: DESK_USER,
        })
        .await
        .unwrap();
    assert_eq!(forced.len(), 1);

    let sample = &world.root_samples("O1")[1];
    assert_eq!(sample.sample.status, SampleStatus::CollectionDone);
    assert_eq!(sample.sample.updated_by, DESK_USER);
    assert_eq!(sample.metadata.collect_later_reason, None);
    assert_eq!(test_status(&world, "O1", "T3").await, TestStatus::Requested);

    let err = service
        .force_mark_collected(ForceCollectedRequest {
            oms_order_id: "O1".to_string(),
            sample_numbers: vec![],
            collected_at: None,
            user_id: DESK_USER,
        })
        .await
        .unwrap_err();
    assert_eq!(err, SampleError::validation(messages::INVALID_PARAMETERS));
}

#[tokio::test]
async fn test_volume_and_task_sequence_updates() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let roots = world.root_samples("O1");
    let service = world.samples();

    let added = service.add_collected_volume(roots[0].id(), 4).await.unwrap();
    assert_eq!(added.oms_order_id, "O1");
    assert_eq!(added.oms_request_id, "R-O1");
    assert_eq!(world.root_samples("O1")[0].metadata.collected_volume, Some(4));

    let updated = service
        .update_task_sequence_for_sample(UpdateTaskSequenceRequest {
            oms_request_id: "R-O1".to_string(),
            task_id: 77,
            oms_test_ids: vec!["T3".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let roots = world.root_samples("O1");
    assert_eq!(roots[0].metadata.task_sequence, None);
    assert_eq!(roots[1].metadata.task_sequence, Some(77));
}

#[tokio::test]
async fn test_sample_details_view() {
    let world = TestWorld::new();
    planned_order(&world, "O1").await;
    let service = world.samples();

    let details = service.get_sample_details("O1").await.unwrap();
    assert_eq!(details.samples.len(), 2);
    assert_eq!(details.mappings.len(), 3);

    let err = service.get_sample_details("").await.unwrap_err();
    assert_eq!(err, SampleError::validation(messages::ORDER_ID_REQUIRED));
    assert!(service.get_visit_details_for_task("O1").await.unwrap().is_empty());
}
