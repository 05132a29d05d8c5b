use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{LabId, SampleId, TestStatus};

/// Downstream notifications emitted after a lifecycle change commits.
///
/// The payloads carry identifiers only; consumers re-read whatever else they need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SampleLifecycleEvent {
    SampleCollected {
        oms_order_id: String,
        oms_test_ids: Vec<String>,
        collected_at: Option<DateTime<Utc>>,
    },
    ResetTats {
        oms_order_id: String,
        oms_test_ids: Vec<String>,
    },
    UpdateTestStatus {
        oms_order_id: String,
        oms_test_ids: Vec<String>,
        status: TestStatus,
        check_order_completion: bool,
    },
    AddRejectedTag {
        oms_order_id: String,
        oms_test_ids: Vec<String>,
        reason: String,
    },
    RemoveRejectedTag {
        oms_order_id: String,
        oms_test_ids: Vec<String>,
    },
    LabEtaUpdate {
        oms_order_id: String,
        lab_id: LabId,
    },
    TestTrackingUpdate {
        oms_order_id: String,
        oms_test_ids: Vec<String>,
        sample_id: Option<SampleId>,
        activity: String,
    },
}

impl SampleLifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SampleCollected { .. } => "sample.collected",
            Self::ResetTats { .. } => "test.reset_tats",
            Self::UpdateTestStatus { .. } => "test.update_status",
            Self::AddRejectedTag { .. } => "order.add_rejected_tag",
            Self::RemoveRejectedTag { .. } => "order.remove_rejected_tag",
            Self::LabEtaUpdate { .. } => "order.lab_eta_update",
            Self::TestTrackingUpdate { .. } => "test.tracking_update",
        }
    }

    pub fn oms_order_id(&self) -> &str {
        match self {
            Self::SampleCollected { oms_order_id, .. }
            | Self::ResetTats { oms_order_id, .. }
            | Self::UpdateTestStatus { oms_order_id, .. }
            | Self::AddRejectedTag { oms_order_id, .. }
            | Self::RemoveRejectedTag { oms_order_id, .. }
            | Self::LabEtaUpdate { oms_order_id, .. }
            | Self::TestTrackingUpdate { oms_order_id, .. } => oms_order_id,
        }
    }
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: SampleLifecycleEvent,
    pub published_at: DateTime<Utc>,
}
