//! Laboratory Information System client.
//!
//! Syncing an order's samples creates a visit in the lab's LIS and returns its id.
//! Tests re-planned onto an already synced sample are added to its visit, and
//! cancelling withdraws tests from it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SampleError};
use crate::models::{LabId, SampleId, SampleRecord, TestDetail};

pub const LIS_SERVICE: &str = "lis";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LisSyncRequest {
    pub oms_order_id: String,
    pub lab_id: LabId,
    pub samples: Vec<SampleRecord>,
    /// Barcode per sample id, as sent on the visit
    pub barcodes: HashMap<SampleId, String>,
}

/// One cancellation recorded by [`RecordingLisClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LisCancellation {
    pub visit_id: String,
    pub sample_id: SampleId,
    pub oms_test_ids: Vec<String>,
}

/// Tests added to an existing visit, recorded by [`RecordingLisClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LisModification {
    pub visit_id: String,
    pub sample_id: SampleId,
    pub oms_test_ids: Vec<String>,
}

#[async_trait]
pub trait LisClient: Send + Sync {
    /// Returns the visit id assigned by the LIS
    async fn sync_data_to_lis(&self, request: LisSyncRequest) -> Result<String>;

    /// Add tests to the visit a sample is already registered on
    async fn modify_lis_sync_data(
        &self,
        tests: &[TestDetail],
        visit_id: &str,
        sample: &SampleRecord,
    ) -> Result<()>;

    async fn cancel_lis_sync_data(
        &self,
        tests: &[TestDetail],
        visit_id: &str,
        sample: &SampleRecord,
    ) -> Result<()>;
}

/// Fake LIS that hands out sequential visit ids and records every call
#[derive(Debug, Default)]
pub struct RecordingLisClient {
    counter: AtomicU64,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    syncs: Mutex<Vec<LisSyncRequest>>,
    modifications: Mutex<Vec<LisModification>>,
    cancellations: Mutex<Vec<LisCancellation>>,
}

impl RecordingLisClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with an upstream error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every sync, keeping the caller suspended inside the call
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn syncs(&self) -> Vec<LisSyncRequest> {
        self.syncs.lock().clone()
    }

    pub fn modifications(&self) -> Vec<LisModification> {
        self.modifications.lock().clone()
    }

    pub fn cancellations(&self) -> Vec<LisCancellation> {
        self.cancellations.lock().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SampleError::upstream(LIS_SERVICE, "lis is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl LisClient for RecordingLisClient {
    async fn sync_data_to_lis(&self, request: LisSyncRequest) -> Result<String> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check_available()?;
        let visit = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.syncs.lock().push(request);
        Ok(format!("VIS-{visit}"))
    }

    async fn modify_lis_sync_data(
        &self,
        tests: &[TestDetail],
        visit_id: &str,
        sample: &SampleRecord,
    ) -> Result<()> {
        self.check_available()?;
        self.modifications.lock().push(LisModification {
            visit_id: visit_id.to_string(),
            sample_id: sample.id(),
            oms_test_ids: tests.iter().map(|t| t.oms_test_id.clone()).collect(),
        });
        Ok(())
    }

    async fn cancel_lis_sync_data(
        &self,
        tests: &[TestDetail],
        visit_id: &str,
        sample: &SampleRecord,
    ) -> Result<()> {
        self.check_available()?;
        self.cancellations.lock().push(LisCancellation {
            visit_id: visit_id.to_string(),
            sample_id: sample.id(),
            oms_test_ids: tests.iter().map(|t| t.oms_test_id.clone()).collect(),
        });
        Ok(())
    }
}
