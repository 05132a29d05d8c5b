//! # Sample Model
//!
//! One physical specimen container and its 1:1 metadata companion.
//!
//! ## Overview
//!
//! A [`Sample`] is identified by its database id and by `(oms_order_id, sample_number)`.
//! Root samples are created by the collection planner; derivative samples
//! (`parent_sample_id` set) are created when a root sample is transferred to a sister lab
//! and share the parent's barcode and sample number.
//!
//! [`SampleMetadata`] holds every lifecycle timestamp and operator-entered detail. It is
//! created in the same transaction as its sample and never exists on its own.
//!
//! ## Database Schema
//!
//! Maps to the `samples` and `sample_metadata` tables:
//! ```sql
//! CREATE TABLE samples (
//!   id BIGSERIAL PRIMARY KEY,
//!   oms_order_id VARCHAR(64) NOT NULL,
//!   sample_number INTEGER NOT NULL,
//!   parent_sample_id BIGINT REFERENCES samples(id),
//!   status VARCHAR(32) NOT NULL,
//!   barcode VARCHAR(64),
//!   -- ... routing columns
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ids::{LabId, SampleId, UserId, VialTypeId};
use crate::state_machine::SampleStatus;

/// A physical specimen container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Sample {
    pub id: SampleId,
    pub oms_order_id: String,
    pub oms_request_id: String,
    pub city_code: String,
    pub vial_type_id: VialTypeId,
    pub sample_number: i32,
    /// Set only on derivative (interlab) samples
    pub parent_sample_id: Option<SampleId>,
    /// Current location; `None` while in flight between labs
    pub lab_id: Option<LabId>,
    pub destination_lab_id: LabId,
    pub visit_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: SampleStatus,
    pub barcode: Option<String>,
    pub rejection_reason: Option<String>,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Sample {
    pub fn is_root(&self) -> bool {
        self.parent_sample_id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some() || self.status == SampleStatus::Deleted
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref().filter(|b| !b.is_empty())
    }

    pub fn visit_id(&self) -> Option<&str> {
        self.visit_id.as_deref().filter(|v| !v.is_empty())
    }
}

/// Lifecycle timestamps and operator details for one sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SampleMetadata {
    /// Assigned by the store when the owning sample is inserted
    pub sample_id: SampleId,
    pub oms_order_id: String,
    pub city_code: String,
    pub collection_sequence_number: i32,
    pub collected_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub accessioned_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub not_received_at: Option<DateTime<Utc>>,
    pub transferred_at: Option<DateTime<Utc>>,
    pub outsourced_at: Option<DateTime<Utc>>,
    pub lis_sync_at: Option<DateTime<Utc>>,
    pub barcode_scanned_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub task_sequence: Option<i64>,
    pub collect_later_reason: Option<String>,
    pub not_received_reason: Option<String>,
    pub barcode_image_url: Option<String>,
    pub rejecting_lab: Option<LabId>,
    pub collected_volume: Option<i32>,
    pub updated_by: UserId,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SampleMetadata {
    pub fn for_order(oms_order_id: &str, city_code: &str, collection_sequence_number: i32) -> Self {
        Self {
            oms_order_id: oms_order_id.to_string(),
            city_code: city_code.to_string(),
            collection_sequence_number,
            ..Self::default()
        }
    }
}

/// A sample together with its metadata, the unit most workflows operate on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample: Sample,
    pub metadata: SampleMetadata,
}

impl SampleRecord {
    pub fn new(sample: Sample, metadata: SampleMetadata) -> Self {
        Self { sample, metadata }
    }

    pub fn id(&self) -> SampleId {
        self.sample.id
    }
}

/// Column values for a sample that has not been inserted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    pub oms_order_id: String,
    pub oms_request_id: String,
    pub city_code: String,
    pub vial_type_id: VialTypeId,
    pub parent_sample_id: Option<SampleId>,
    pub lab_id: Option<LabId>,
    pub destination_lab_id: LabId,
    pub status: SampleStatus,
    pub barcode: Option<String>,
    pub visit_id: Option<String>,
    pub created_by: UserId,
}

impl NewSample {
    /// Materialise the row the store will write, given the allocated id and number
    pub fn into_sample(self, id: SampleId, sample_number: i32, now: DateTime<Utc>) -> Sample {
        Sample {
            id,
            oms_order_id: self.oms_order_id,
            oms_request_id: self.oms_request_id,
            city_code: self.city_code,
            vial_type_id: self.vial_type_id,
            sample_number,
            parent_sample_id: self.parent_sample_id,
            lab_id: self.lab_id,
            destination_lab_id: self.destination_lab_id,
            visit_id: self.visit_id,
            status: self.status,
            barcode: self.barcode,
            rejection_reason: None,
            updated_by: self.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
