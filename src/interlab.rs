//! # Interlab Samples
//!
//! A root sample routed to a sister lab is marked `Transferred` and gets a derivative
//! sample that travels in its place. The derivative shares the parent's barcode, vial and
//! sample number, starts `InTransfer` with no current lab, and copies the parent's
//! metadata with `transferred_at` stamped. The parent is kept as the audit trail.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::constants::{messages, SYSTEM_USER_ID};
use crate::error::{Result, SampleError};
use crate::models::{LabId, NewSample, SampleId, SampleRecord};
use crate::state_machine::SampleStatus;
use crate::store::{PlannedSample, SampleStore};

/// Plan one derivative per parent, headed for the lab mapped to its sample number.
///
/// Parents whose sample number has no destination are skipped.
pub fn plan_derivatives(
    parents: &[SampleRecord],
    destinations: &HashMap<i32, LabId>,
    now: DateTime<Utc>,
) -> Result<Vec<PlannedSample>> {
    if parents.is_empty() {
        return Err(SampleError::validation(messages::NO_INTERLAB_SAMPLES));
    }

    Ok(parents
        .iter()
        .filter_map(|parent| {
            let destination = *destinations.get(&parent.sample.sample_number)?;
            Some(derivative_of(parent, destination, now))
        })
        .collect())
}

fn derivative_of(parent: &SampleRecord, destination: LabId, now: DateTime<Utc>) -> PlannedSample {
    let sample = &parent.sample;
    let new_sample = NewSample {
        oms_order_id: sample.oms_order_id.clone(),
        oms_request_id: sample.oms_request_id.clone(),
        city_code: sample.city_code.clone(),
        vial_type_id: sample.vial_type_id,
        parent_sample_id: Some(sample.id),
        lab_id: None,
        destination_lab_id: destination,
        status: SampleStatus::InTransfer,
        barcode: sample.barcode.clone(),
        visit_id: None,
        created_by: SYSTEM_USER_ID,
    };

    let mut metadata = parent.metadata.clone();
    metadata.sample_id = SampleId::default();
    metadata.accessioned_at = None;
    metadata.outsourced_at = None;
    metadata.transferred_at = Some(now);
    metadata.last_updated_at = Some(now);
    metadata.updated_by = SYSTEM_USER_ID;
    metadata.deleted_at = None;

    PlannedSample::with_number(new_sample, metadata, sample.sample_number)
}

/// Derivatives created from `parent_id`, for reconciliation
pub async fn get_interlab_samples_by_parent(
    store: &Arc<dyn SampleStore>,
    parent_id: SampleId,
) -> Result<Vec<SampleRecord>> {
    if parent_id.is_unset() {
        return Err(SampleError::validation(messages::SAMPLE_ID_REQUIRED));
    }
    store.get_interlab_samples_by_parent(parent_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SampleMetadata, UserId, VialTypeId};

    fn parent(number: i32) -> SampleRecord {
        let sample = NewSample {
            oms_order_id: "O1".to_string(),
            oms_request_id: "R1".to_string(),
            city_code: "BLR".to_string(),
            vial_type_id: VialTypeId(5),
            parent_sample_id: None,
            lab_id: Some(LabId(1)),
            destination_lab_id: LabId(1),
            status: SampleStatus::Transferred,
            barcode: Some(format!("BC{number}")),
            visit_id: None,
            created_by: UserId(7),
        }
        .into_sample(SampleId(number as i64), number, Utc::now());
        let mut metadata = SampleMetadata::for_order("O1", "BLR", 1);
        metadata.sample_id = sample.id;
        metadata.received_at = Some(Utc::now());
        SampleRecord::new(sample, metadata)
    }

    #[test]
    fn test_derivative_copies_parent_identity() {
        let now = Utc::now();
        let destinations = HashMap::from([(2, LabId(3))]);
        let planned = plan_derivatives(&[parent(1), parent(2)], &destinations, now).unwrap();

        assert_eq!(planned.len(), 1);
        let child = &planned[0];
        assert_eq!(child.sample_number, Some(2));
        assert_eq!(child.sample.parent_sample_id, Some(SampleId(2)));
        assert_eq!(child.sample.status, SampleStatus::InTransfer);
        assert_eq!(child.sample.lab_id, None);
        assert_eq!(child.sample.destination_lab_id, LabId(3));
        assert_eq!(child.sample.barcode.as_deref(), Some("BC2"));
        assert_eq!(child.metadata.transferred_at, Some(now));
        assert!(child.metadata.received_at.is_some());
    }

    #[test]
    fn test_empty_parent_list_is_rejected() {
        let err = plan_derivatives(&[], &HashMap::new(), Utc::now()).unwrap_err();
        assert_eq!(err, SampleError::validation(messages::NO_INTERLAB_SAMPLES));
    }
}
