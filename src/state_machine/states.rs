use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::StateMachineError;

/// Lifecycle status of a physical sample, persisted as its snake_case name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    /// Planned but not yet drawn
    Default,
    /// Drawn by the collector
    CollectionDone,
    /// Collection could not be confirmed by the field app
    NotCollectedEmedic,
    /// Accepted at a receiving desk
    Received,
    /// Registered in the lab's LIS with a visit id
    Synced,
    /// Accessioned at the processing bench
    Accessioned,
    /// Handed to a third-party lab
    Outsourced,
    /// Derivative sample travelling to a sister lab
    InTransfer,
    /// Parent sample whose work moved to a sister lab
    Transferred,
    /// Transfer to a sister lab did not arrive
    TransferFailed,
    /// Some, but not all, mapped tests rejected
    PartiallyRejected,
    /// Every mapped test rejected
    Rejected,
    /// Expected at the lab but never arrived
    NotReceived,
    /// Soft-deleted
    Deleted,
}

impl SampleStatus {
    pub const ALL: [SampleStatus; 14] = [
        Self::Default,
        Self::CollectionDone,
        Self::NotCollectedEmedic,
        Self::Received,
        Self::Synced,
        Self::Accessioned,
        Self::Outsourced,
        Self::InTransfer,
        Self::Transferred,
        Self::TransferFailed,
        Self::PartiallyRejected,
        Self::Rejected,
        Self::NotReceived,
        Self::Deleted,
    ];

    /// No rejection or routing transition leaves these states
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Deleted)
    }

    /// The sample has physically been drawn
    pub fn is_collected(&self) -> bool {
        !matches!(self, Self::Default | Self::Deleted)
    }

    /// Re-planning may map further tests onto a sample in this state
    pub fn accepts_new_tests(&self) -> bool {
        !matches!(
            self,
            Self::Rejected | Self::Deleted | Self::NotReceived | Self::TransferFailed
        )
    }

    /// Test changes on the sample must be mirrored onto its LIS visit
    pub fn tracks_lis_visit(&self) -> bool {
        matches!(
            self,
            Self::Synced | Self::Accessioned | Self::PartiallyRejected
        )
    }

    /// The receiving desk already routed the sample to its final destination
    pub fn is_routed(&self) -> bool {
        matches!(
            self,
            Self::Synced | Self::Accessioned | Self::Outsourced | Self::Transferred
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::CollectionDone => "collection_done",
            Self::NotCollectedEmedic => "not_collected_emedic",
            Self::Received => "received",
            Self::Synced => "synced",
            Self::Accessioned => "accessioned",
            Self::Outsourced => "outsourced",
            Self::InTransfer => "in_transfer",
            Self::Transferred => "transferred",
            Self::TransferFailed => "transfer_failed",
            Self::PartiallyRejected => "partially_rejected",
            Self::Rejected => "rejected",
            Self::NotReceived => "not_received",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SampleStatus {
    type Err = StateMachineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StateMachineError::UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for SampleStatus {
    type Error = StateMachineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Default for SampleStatus {
    fn default() -> Self {
        Self::Default
    }
}
