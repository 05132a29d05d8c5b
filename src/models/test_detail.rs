//! # Test Detail Model
//!
//! An ordered test on an order. Owned by the order-management side; this crate reads it
//! for routing and writes a small set of columns (status, processing lab, task id and lab
//! ETA/TAT) through [`TestDetailUpdate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::ids::{LabId, MasterTestId, TaskId};

/// Processing status of an ordered test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Requested,
    ResultPending,
    ResultSaved,
    Rejected,
    RerunRequested,
    RerunResultSaved,
    Withheld,
    CoAuthorize,
    Approve,
    CompletedNotSent,
    CompletedSent,
    InTransfer,
    TransferFailed,
    SampleNotReceived,
    CollectSampleLater,
    LabReceived,
}

impl TestStatus {
    pub const ALL: [TestStatus; 16] = [
        Self::Requested,
        Self::ResultPending,
        Self::ResultSaved,
        Self::Rejected,
        Self::RerunRequested,
        Self::RerunResultSaved,
        Self::Withheld,
        Self::CoAuthorize,
        Self::Approve,
        Self::CompletedNotSent,
        Self::CompletedSent,
        Self::InTransfer,
        Self::TransferFailed,
        Self::SampleNotReceived,
        Self::CollectSampleLater,
        Self::LabReceived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::ResultPending => "result_pending",
            Self::ResultSaved => "result_saved",
            Self::Rejected => "rejected",
            Self::RerunRequested => "rerun_requested",
            Self::RerunResultSaved => "rerun_result_saved",
            Self::Withheld => "withheld",
            Self::CoAuthorize => "co_authorize",
            Self::Approve => "approve",
            Self::CompletedNotSent => "completed_not_sent",
            Self::CompletedSent => "completed_sent",
            Self::InTransfer => "in_transfer",
            Self::TransferFailed => "transfer_failed",
            Self::SampleNotReceived => "sample_not_received",
            Self::CollectSampleLater => "collect_sample_later",
            Self::LabReceived => "lab_received",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid test status: {s}"))
    }
}

/// Error returned when a persisted test status is not recognised
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UnknownTestStatus(String);

impl TryFrom<String> for TestStatus {
    type Error = UnknownTestStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(UnknownTestStatus)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TestDetail {
    pub id: i64,
    pub oms_order_id: String,
    /// Central order-management test id; the key mappings and events use
    pub oms_test_id: String,
    pub test_name: String,
    pub city_code: String,
    pub task_id: Option<TaskId>,
    pub lab_id: LabId,
    pub processing_lab_id: LabId,
    pub master_test_id: MasterTestId,
    #[sqlx(try_from = "String")]
    pub status: TestStatus,
    pub lab_eta: Option<DateTime<Utc>>,
    /// Lab turnaround in hours
    pub lab_tat: Option<f64>,
}

/// Column changes for one test, applied inside the caller's transaction.
/// `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestDetailUpdate {
    pub oms_test_id: String,
    pub status: Option<TestStatus>,
    pub processing_lab_id: Option<LabId>,
    pub task_id: Option<TaskId>,
    pub lab_eta: Option<DateTime<Utc>>,
    pub lab_tat: Option<f64>,
}

impl TestDetailUpdate {
    pub fn new(oms_test_id: impl Into<String>) -> Self {
        Self {
            oms_test_id: oms_test_id.into(),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: TestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn processing_lab(mut self, lab_id: LabId) -> Self {
        self.processing_lab_id = Some(lab_id);
        self
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn lab_eta(mut self, lab_eta: DateTime<Utc>, lab_tat: f64) -> Self {
        self.lab_eta = Some(lab_eta);
        self.lab_tat = Some(lab_tat);
        self
    }

    /// Apply to an in-memory row
    pub fn apply_to(&self, test: &mut TestDetail) {
        if let Some(status) = self.status {
            test.status = status;
        }
        if let Some(lab_id) = self.processing_lab_id {
            test.processing_lab_id = lab_id;
        }
        if let Some(task_id) = self.task_id {
            test.task_id = Some(task_id);
        }
        if let Some(lab_eta) = self.lab_eta {
            test.lab_eta = Some(lab_eta);
        }
        if let Some(lab_tat) = self.lab_tat {
            test.lab_tat = Some(lab_tat);
        }
    }
}
