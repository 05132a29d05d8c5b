//! # Sample Store
//!
//! Persistence boundary for samples, their metadata and test-sample mappings. Reads are
//! plain queries; every write goes through [`SampleStore::apply`], which commits a whole
//! [`ChangeSet`] in one transaction or nothing at all.
//!
//! Sample numbers for new root samples are allocated inside that transaction as
//! `max(sample_number) + n` while holding a per-order lock, so concurrent planners for the
//! same order cannot collide.

pub mod changes;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{LabId, SampleId, SampleRecord, TestSampleMapping};
use crate::state_machine::SampleStatus;

pub use changes::{
    AppliedChanges, ChangeSet, MappingRejection, PlannedSample, TaskAssignment, TaskRef,
};
pub use memory::InMemoryStore;
pub use postgres::PgSampleStore;

/// Read and write primitives over samples and mappings.
///
/// Reads never return soft-deleted rows.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// `NotFound` when the id does not exist or is deleted
    async fn get_sample(&self, id: SampleId) -> Result<SampleRecord>;

    async fn get_samples_by_ids(&self, ids: &[SampleId]) -> Result<Vec<SampleRecord>>;

    async fn get_samples_by_order(&self, oms_order_id: &str) -> Result<Vec<SampleRecord>>;

    async fn get_samples_by_request(&self, oms_request_id: &str) -> Result<Vec<SampleRecord>>;

    /// Roots and derivatives carrying any of the sample numbers
    async fn get_samples_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<Vec<SampleRecord>>;

    /// Samples holding `barcode`; an empty status filter matches every status
    async fn get_samples_by_barcode(
        &self,
        barcode: &str,
        statuses: &[SampleStatus],
    ) -> Result<Vec<SampleRecord>>;

    /// Samples of an order headed for `destination_lab_id` in one of `statuses`
    async fn get_collected_samples(
        &self,
        oms_order_id: &str,
        destination_lab_id: LabId,
        statuses: &[SampleStatus],
    ) -> Result<Vec<SampleRecord>>;

    /// `(barcode, holder)` pairs for every live sample already holding one of `barcodes`
    async fn find_existing_barcodes(&self, barcodes: &[String]) -> Result<Vec<(String, SampleId)>>;

    async fn get_interlab_samples_by_parent(&self, parent_id: SampleId)
        -> Result<Vec<SampleRecord>>;

    async fn get_mappings_by_order(&self, oms_order_id: &str) -> Result<Vec<TestSampleMapping>>;

    async fn get_mappings_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<Vec<TestSampleMapping>>;

    /// Commit every change in one transaction
    async fn apply(&self, changes: ChangeSet) -> Result<AppliedChanges>;
}
