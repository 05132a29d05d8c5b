//! # Collaborator Lookups
//!
//! Read access to entities this crate references but does not own: orders, patients,
//! test details and tasks. The Postgres implementations live in [`postgres`]; the
//! in-memory store in [`crate::store::memory`] implements the same traits for tests.
//!
//! Writes to test details and tasks that must commit together with sample changes go
//! through [`crate::store::ChangeSet`] instead.

pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{OrderDetails, PatientDetails, Task, TestDetail, TestDetailUpdate, TestSampleMapping};

pub use postgres::PgLookups;

#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn get_order_by_oms_order_id(&self, oms_order_id: &str) -> Result<Option<OrderDetails>>;

    async fn get_order_by_trf_id(&self, trf_id: &str) -> Result<Option<OrderDetails>>;
}

#[async_trait]
pub trait PatientLookup: Send + Sync {
    /// `NotFound` when the patient row is missing
    async fn get_patient_details(&self, patient_details_id: i64) -> Result<PatientDetails>;
}

/// Tests of an order together with the mappings that selected them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestsWithMappings {
    pub tests: Vec<TestDetail>,
    pub mappings: Vec<TestSampleMapping>,
}

impl TestsWithMappings {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Active mappings on one sample number
    pub fn mappings_for(&self, sample_number: i32) -> impl Iterator<Item = &TestSampleMapping> {
        self.mappings
            .iter()
            .filter(move |m| m.sample_number == sample_number && m.is_active())
    }

    pub fn test(&self, oms_test_id: &str) -> Option<&TestDetail> {
        self.tests.iter().find(|t| t.oms_test_id == oms_test_id)
    }
}

#[async_trait]
pub trait TestLookup: Send + Sync {
    async fn get_tests_by_order(&self, oms_order_id: &str) -> Result<Vec<TestDetail>>;

    async fn get_tests_by_oms_test_ids(&self, oms_test_ids: &[String]) -> Result<Vec<TestDetail>>;

    /// Tests mapped (by an active mapping) to any of the sample numbers
    async fn get_tests_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<TestsWithMappings>;

    /// Standalone update, outside any sample transaction
    async fn update_test_details(&self, oms_order_id: &str, updates: Vec<TestDetailUpdate>)
        -> Result<()>;
}

#[async_trait]
pub trait TaskService: Send + Sync {
    /// The active task of an order, if one exists
    async fn get_task_by_oms_order_id(&self, oms_order_id: &str) -> Result<Option<Task>>;
}
