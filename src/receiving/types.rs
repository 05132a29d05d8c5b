//! Request and response shapes of the receiving desk.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::{messages, search_types, RECEIVING_ERROR_SEPARATOR};
use crate::error::{Result, SampleError};
use crate::models::{LabId, LabType, SampleId, UserId, VialTypeId};
use crate::state_machine::SampleStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    OrderId,
    Barcode,
    TrfId,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderId => search_types::ORDER_ID,
            Self::Barcode => search_types::BARCODE,
            Self::TrfId => search_types::TRF_ID,
        }
    }

    /// Message returned when the search value is blank
    fn missing_value_message(&self) -> &'static str {
        match self {
            Self::OrderId => messages::INVALID_ORDER_ID,
            Self::Barcode => messages::BARCODE_REQUIRED,
            Self::TrfId => messages::TRF_ID_REQUIRED,
        }
    }
}

impl FromStr for SearchType {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            search_types::ORDER_ID => Ok(Self::OrderId),
            search_types::BARCODE => Ok(Self::Barcode),
            search_types::TRF_ID => Ok(Self::TrfId),
            _ => Err(SampleError::validation(messages::INVALID_SEARCH_TYPE)),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup of the samples a lab is waiting to receive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedSamplesRequest {
    pub lab_id: LabId,
    pub search_type: String,
    pub value: String,
}

impl CollectedSamplesRequest {
    pub fn new(lab_id: LabId, search_type: SearchType, value: impl Into<String>) -> Self {
        Self {
            lab_id,
            search_type: search_type.as_str().to_string(),
            value: value.into(),
        }
    }

    /// Checked in order: lab, search type, then the value for that type
    pub fn validate(&self) -> Result<(SearchType, &str)> {
        if self.lab_id.is_unset() {
            return Err(SampleError::validation(messages::LAB_ID_REQUIRED));
        }
        let search_type: SearchType = self.search_type.parse()?;
        let value = self.value.trim();
        if value.is_empty() {
            return Err(SampleError::validation(search_type.missing_value_message()));
        }
        Ok((search_type, value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub name: String,
    pub dob: Option<NaiveDate>,
    pub expected_dob: Option<NaiveDate>,
    pub age: u32,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub oms_test_id: String,
    pub test_name: String,
    pub processing_lab_id: LabId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabSummary {
    pub id: LabId,
    pub name: String,
    pub lab_type: LabType,
}

/// One sample as shown at the desk, scoped to one processing lab of its tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedSample {
    pub id: SampleId,
    pub parent_sample_id: Option<SampleId>,
    pub oms_order_id: String,
    pub oms_request_id: String,
    pub city_code: String,
    pub barcode: Option<String>,
    pub trf_id: Option<String>,
    pub vial_type_id: VialTypeId,
    pub sample_number: i32,
    pub status: SampleStatus,
    pub collect_later_reason: Option<String>,
    pub not_received_reason: Option<String>,
    pub patient: PatientSummary,
    pub tests: Vec<TestSummary>,
    pub lab: LabSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedSamplesResponse {
    pub collected_samples: Vec<CollectedSample>,
}

impl CollectedSamplesResponse {
    pub fn is_empty(&self) -> bool {
        self.collected_samples.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveSample {
    pub sample_id: SampleId,
    pub barcode: String,
}

impl ReceiveSample {
    pub fn new(sample_id: SampleId, barcode: impl Into<String>) -> Self {
        Self {
            sample_id,
            barcode: barcode.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveSamplesRequest {
    pub receiving_lab_id: LabId,
    pub user_id: UserId,
    pub samples: Vec<ReceiveSample>,
}

impl ReceiveSamplesRequest {
    pub fn validate(&self) -> Result<()> {
        if self.receiving_lab_id.is_unset() {
            return Err(SampleError::validation(messages::LAB_ID_REQUIRED));
        }
        if self.samples.is_empty() {
            return Err(SampleError::validation(messages::SAMPLE_ID_REQUIRED));
        }
        for sample in &self.samples {
            if sample.sample_id.is_unset() {
                return Err(SampleError::validation(messages::SAMPLE_ID_REQUIRED));
            }
        }
        for sample in &self.samples {
            if sample.barcode.trim().is_empty() {
                return Err(SampleError::validation(messages::BARCODE_REQUIRED));
            }
        }
        Ok(())
    }
}

/// A failed order of a receive batch
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFailure {
    pub order_id: String,
    pub error: SampleError,
}

impl fmt::Display for OrderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}, err: {}",
            messages::RECEIVING_FAILED_FOR_ORDER,
            self.order_id,
            self.error.message()
        )
    }
}

/// Outcome of a receive batch: the orders that went through and every one that did not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiveSummary {
    pub succeeded: Vec<String>,
    pub failures: Vec<OrderFailure>,
}

impl ReceiveSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// One line per failed order, `None` when every order succeeded
    pub fn error_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(RECEIVING_ERROR_SEPARATOR),
        )
    }

    /// Succeeded order ids, or an internal error carrying the combined message
    pub fn into_result(self) -> Result<Vec<String>> {
        match self.error_message() {
            Some(message) => Err(SampleError::internal(message)),
            None => Ok(self.succeeded),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkNotReceivedRequest {
    pub sample_id: SampleId,
    pub reason: String,
    pub user_id: UserId,
    /// Publish TAT reset and test status events after commit
    pub send_events: bool,
}

impl MarkNotReceivedRequest {
    pub fn validate(&self) -> Result<()> {
        if self.sample_id.is_unset() {
            return Err(SampleError::validation(messages::SAMPLE_ID_REQUIRED));
        }
        if self.reason.trim().is_empty() {
            return Err(SampleError::validation(
                messages::NOT_RECEIVED_REASON_REQUIRED,
            ));
        }
        Ok(())
    }
}
