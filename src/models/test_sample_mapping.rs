//! # Test Sample Mapping Model
//!
//! Many-to-many join between an order's tests and its samples. Each mapping carries its
//! own rejection and recollection flags so one sample can have some tests rejected while
//! the rest stay valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ids::{SampleId, VialTypeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TestSampleMapping {
    pub id: i64,
    pub oms_order_id: String,
    pub city_code: String,
    pub oms_test_id: String,
    pub vial_type_id: VialTypeId,
    pub sample_id: SampleId,
    pub sample_number: i32,
    pub recollection_pending: bool,
    pub is_rejected: bool,
    pub rejection_reason: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TestSampleMapping {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Which sample a new mapping points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleSlot {
    /// A sample that already exists
    Existing {
        sample_id: SampleId,
        sample_number: i32,
    },
    /// The n-th (1-based) sample planned in the same change set; the store turns this into
    /// `max(sample_number) + n` for the order while holding the order's allocation lock
    Planned(i32),
}

/// Column values for a mapping that has not been inserted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTestSampleMapping {
    pub oms_order_id: String,
    pub city_code: String,
    pub oms_test_id: String,
    pub vial_type_id: VialTypeId,
    pub slot: SampleSlot,
    pub recollection_pending: bool,
}

/// How an existing mapping row is selected for rejection or deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingSelector {
    /// Every mapping pointing at this sample
    BySample(SampleId),
    /// One test on one sample number of an order
    ByTestAndSampleNumber {
        oms_order_id: String,
        oms_test_id: String,
        sample_number: i32,
    },
    /// Every mapping of these tests in an order
    ByTests {
        oms_order_id: String,
        oms_test_ids: Vec<String>,
    },
}

impl MappingSelector {
    pub fn matches(&self, mapping: &TestSampleMapping) -> bool {
        if !mapping.is_active() {
            return false;
        }
        match self {
            Self::BySample(sample_id) => mapping.sample_id == *sample_id,
            Self::ByTestAndSampleNumber {
                oms_order_id,
                oms_test_id,
                sample_number,
            } => {
                &mapping.oms_order_id == oms_order_id
                    && &mapping.oms_test_id == oms_test_id
                    && mapping.sample_number == *sample_number
            }
            Self::ByTests {
                oms_order_id,
                oms_test_ids,
            } => {
                &mapping.oms_order_id == oms_order_id
                    && oms_test_ids.iter().any(|id| id == &mapping.oms_test_id)
            }
        }
    }
}
