use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::LabId;

/// Events that can trigger sample status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SampleEvent {
    /// Collector confirms the draw; `collected_at` defaults to the transition time
    MarkCollected { collected_at: Option<DateTime<Utc>> },
    /// Operator overrides the collection state
    ForceCollected { collected_at: Option<DateTime<Utc>> },
    /// Field app could not confirm the draw
    MarkNotCollectedEmedic,
    /// A receiving desk accepted the sample
    Receive,
    /// The processing bench accessioned the sample
    Accession,
    /// In-house LIS registration succeeded
    SyncToLis { visit_id: String },
    /// The LIS visit no longer matches the sample's tests; back to the receiving desk
    ResetLisSync,
    /// Work handed to a third-party lab
    Outsource { next_destination: LabId },
    /// Work moved to a sister lab; the parent stays as the audit trail
    Transfer,
    /// Sample dispatched between labs
    Dispatch,
    /// Transfer did not arrive
    FailTransfer,
    /// Every mapped test rejected
    Reject { reason: String, rejecting_lab: LabId },
    /// One mapped test rejected
    PartiallyReject { reason: String, rejecting_lab: LabId },
    /// The last surviving test of a partially rejected sample was rejected
    PromoteToRejected,
    /// Expected at the lab but never arrived
    MarkNotReceived { reason: String },
    /// Soft delete
    Delete,
}

impl SampleEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MarkCollected { .. } => "mark_collected",
            Self::ForceCollected { .. } => "force_collected",
            Self::MarkNotCollectedEmedic => "mark_not_collected_emedic",
            Self::Receive => "receive",
            Self::Accession => "accession",
            Self::SyncToLis { .. } => "sync_to_lis",
            Self::ResetLisSync => "reset_lis_sync",
            Self::Outsource { .. } => "outsource",
            Self::Transfer => "transfer",
            Self::Dispatch => "dispatch",
            Self::FailTransfer => "fail_transfer",
            Self::Reject { .. } => "reject",
            Self::PartiallyReject { .. } => "partially_reject",
            Self::PromoteToRejected => "promote_to_rejected",
            Self::MarkNotReceived { .. } => "mark_not_received",
            Self::Delete => "delete",
        }
    }

    /// Reason text carried by rejection and not-received events
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Reject { reason, .. }
            | Self::PartiallyReject { reason, .. }
            | Self::MarkNotReceived { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Reject { .. } | Self::PartiallyReject { .. } | Self::PromoteToRejected
        )
    }
}
