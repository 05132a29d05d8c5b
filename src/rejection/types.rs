use serde::{Deserialize, Serialize};

use crate::constants::messages;
use crate::error::{Result, SampleError};
use crate::models::{LabId, UserId};

/// Reject every sample carrying a barcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectSampleRequest {
    pub barcode: String,
    pub reason: String,
    pub lab_id: LabId,
    pub user_id: UserId,
}

impl RejectSampleRequest {
    pub fn validate(&self) -> Result<()> {
        if self.barcode.trim().is_empty() {
            return Err(SampleError::validation(messages::BARCODE_REQUIRED));
        }
        validate_common(&self.reason, self.lab_id)
    }
}

/// Reject one test on one sample number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRejectionRequest {
    pub oms_order_id: String,
    pub sample_number: i32,
    pub oms_test_id: String,
    pub reason: String,
    pub lab_id: LabId,
    pub user_id: UserId,
}

impl PartialRejectionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.oms_order_id.trim().is_empty() {
            return Err(SampleError::validation(messages::ORDER_ID_REQUIRED));
        }
        if self.sample_number <= 0 {
            return Err(SampleError::validation(messages::INVALID_PARAMETERS));
        }
        if self.oms_test_id.trim().is_empty() {
            return Err(SampleError::validation(messages::TEST_ID_REQUIRED));
        }
        validate_common(&self.reason, self.lab_id)
    }
}

fn validate_common(reason: &str, lab_id: LabId) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(SampleError::validation(messages::REJECTION_REASON_REQUIRED));
    }
    if lab_id.is_unset() {
        return Err(SampleError::validation(messages::LAB_ID_REQUIRED));
    }
    Ok(())
}

/// The order a rejection touched and the tests it affected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RejectionOutcome {
    pub oms_order_id: String,
    pub oms_test_ids: Vec<String>,
}
