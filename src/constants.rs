//! # System Constants
//!
//! Fixed identifiers, status sets and message strings shared across the receiving,
//! rejection and planning workflows.

use crate::models::UserId;
use crate::state_machine::SampleStatus;

/// Actor recorded on rows written by background and system-initiated work
pub const SYSTEM_USER_ID: UserId = UserId(1);

/// Default broadcast capacity for the lifecycle event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Default lifetime of the per-order receive marker
pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 3600;

pub const DEFAULT_LOCK_KEY_PREFIX: &str = "receive_and_sync";

/// Joins per-order failures in a receive batch's combined message
pub const RECEIVING_ERROR_SEPARATOR: &str = "\n";

/// Search types accepted by the collected-samples lookup
pub mod search_types {
    pub const ORDER_ID: &str = "order_id";
    pub const BARCODE: &str = "barcode";
    pub const TRF_ID: &str = "trf_id";
}

/// Statuses a barcode scan at a receiving desk may find
pub const BARCODE_LOOKUP_STATUSES: [SampleStatus; 5] = [
    SampleStatus::CollectionDone,
    SampleStatus::NotCollectedEmedic,
    SampleStatus::InTransfer,
    SampleStatus::Received,
    SampleStatus::Synced,
];

/// Statuses listed as "waiting to be received" for a lab
pub const COLLECTED_LISTING_STATUSES: [SampleStatus; 4] = [
    SampleStatus::CollectionDone,
    SampleStatus::NotCollectedEmedic,
    SampleStatus::InTransfer,
    SampleStatus::Received,
];

/// Reasons that must not open a support ticket on rejection
pub const DEFAULT_TICKET_SUPPRESSED_REASONS: [&str; 2] =
    ["Duplicate Test (NA)", "Sync Error / Barcode Error (NA)"];

/// Collect-later reason that still leaves the test in `requested`
pub const COLLECT_LATER_REQUESTED_REASON: &str = "Sample to be collected later";

pub mod ticket_subjects {
    pub const FULL_REJECTION: &str = "Sample Completely Rejected, Action Needed";
    pub const PARTIAL_REJECTION: &str = "Sample Partially Rejected, Action Needed";
}

/// User-facing error messages that callers match on
pub mod messages {
    pub const LAB_ID_REQUIRED: &str = "lab_id is required";
    pub const INVALID_SEARCH_TYPE: &str = "invalid search type";
    pub const INVALID_ORDER_ID: &str = "invalid order_id";
    pub const BARCODE_REQUIRED: &str = "barcode is required";
    pub const TRF_ID_REQUIRED: &str = "trf_id is required";
    pub const SAMPLE_ID_REQUIRED: &str = "sample_id is required";
    pub const NOT_RECEIVED_REASON_REQUIRED: &str = "not_received_reason is required";
    pub const TEST_ID_REQUIRED: &str = "test_id is required";
    pub const DUPLICATE_BARCODE: &str = "duplicate barcode found";
    pub const RECEIVE_IN_PROGRESS: &str = "receive and sync is already in progress for this order";
    pub const MULTI_ORDER_DISABLED: &str = "receiving samples of multiple orders is not allowed";
    pub const SAMPLES_NOT_FOUND: &str = "samples not found";
    pub const NO_ORDERS_FOUND: &str = "no orders found for the given samples";
    pub const TRF_NOT_DIGITIZED: &str = "this is a trf order, please digitize the order first";
    pub const SAMPLE_ALREADY_REJECTED: &str = "sample already rejected";
    pub const TEST_NOT_MAPPED_TO_SAMPLE: &str = "test is not mapped to this sample";
    pub const TEST_ALREADY_REJECTED: &str = "test already rejected on this sample";
    pub const NO_SAMPLES_TO_COLLECT: &str = "no samples found to mark collected";
    pub const NO_INTERLAB_SAMPLES: &str = "no interlab samples";
    pub const REJECTION_REASON_REQUIRED: &str = "rejection reason is required";
    pub const INVALID_PARAMETERS: &str = "invalid parameters";
    pub const BARCODE_OR_REASON_REQUIRED: &str =
        "barcode and collect later reason both cannot be empty";
    pub const BARCODE_IMAGE_REQUIRED: &str = "barcode image url and scanned time are required";
    pub const ORDER_ID_REQUIRED: &str = "order_id is required";
    pub const REQUEST_ID_REQUIRED: &str = "request_id is required";
    pub const TASK_ID_REQUIRED: &str = "task_id is required";
    pub const TEST_IDS_REQUIRED: &str = "test_ids are required";
    pub const ORDER_NOT_FOUND: &str = "order id not found";
    pub const BARCODE_NOT_FOUND: &str = "barcode not found";
    pub const TRF_NOT_FOUND: &str = "trf id not found";
    pub const RECEIVING_FAILED_FOR_ORDER: &str = "error in receiving for this order id";
}

/// Rejects a barcode scan made at an in-house lab the sample is not headed for
pub fn scanned_at_incorrect_lab(lab_name: &str) -> String {
    format!("this sample belongs to '{}' lab", lab_name.to_lowercase())
}
