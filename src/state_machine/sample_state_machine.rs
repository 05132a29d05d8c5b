use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    errors::{invalid_transition, StateMachineResult},
    events::SampleEvent,
    guards::{default_guards, StateGuard},
    states::SampleStatus,
};
use crate::models::{SampleRecord, UserId};

/// Resolve the status an event leads to from `current`.
///
/// This is the complete transition table; any pair not listed is rejected.
pub fn determine_target_state(
    current: SampleStatus,
    event: &SampleEvent,
) -> StateMachineResult<SampleStatus> {
    use SampleEvent as E;
    use SampleStatus as S;

    let target = match (current, event) {
        // Nothing leaves a deleted sample
        (S::Deleted, _) => return Err(invalid_transition(current, event.event_type())),

        // Collection
        (S::Default | S::CollectionDone, E::MarkCollected { .. }) => S::CollectionDone,
        (S::Default | S::CollectionDone | S::NotCollectedEmedic, E::ForceCollected { .. }) => {
            S::CollectionDone
        }
        (S::Default | S::CollectionDone, E::MarkNotCollectedEmedic) => S::NotCollectedEmedic,

        // Receiving
        (
            S::CollectionDone | S::NotCollectedEmedic | S::InTransfer | S::Received,
            E::Receive,
        ) => S::Received,

        // Routing out of the receiving desk
        (S::Received, E::SyncToLis { .. }) => S::Synced,
        (S::Received, E::Outsource { .. }) => S::Outsourced,
        (S::Received, E::Transfer) => S::Transferred,
        (S::Received, E::Dispatch) => S::InTransfer,
        (S::Received | S::Synced, E::Accession) => S::Accessioned,
        (S::Synced, E::ResetLisSync) => S::Received,
        (S::InTransfer, E::FailTransfer) => S::TransferFailed,

        // Rejection, from any non-terminal state
        (S::Rejected, E::Reject { .. } | E::PartiallyReject { .. }) => {
            return Err(invalid_transition(current, event.event_type()))
        }
        (_, E::Reject { .. }) => S::Rejected,
        (_, E::PartiallyReject { .. }) => S::PartiallyRejected,
        (S::PartiallyRejected, E::PromoteToRejected) => S::Rejected,

        // Not received at the lab
        (
            S::Default
            | S::CollectionDone
            | S::NotCollectedEmedic
            | S::InTransfer
            | S::Received
            | S::Transferred
            | S::NotReceived,
            E::MarkNotReceived { .. },
        ) => S::NotReceived,

        (_, E::Delete) => S::Deleted,

        (from, _) => return Err(invalid_transition(from, event.event_type())),
    };

    Ok(target)
}

/// Check a transition without applying it
pub fn can_transition(current: SampleStatus, event: &SampleEvent) -> bool {
    determine_target_state(current, event).is_ok()
}

/// Applies events to in-memory sample records: resolves the target status through the
/// transition table, runs guards, then stamps the status-specific columns.
///
/// Persisting the mutated record is the caller's job, normally as part of a
/// [`ChangeSet`](crate::store::ChangeSet).
pub struct SampleStateMachine {
    guards: Vec<Box<dyn StateGuard>>,
}

impl Default for SampleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStateMachine {
    pub fn new() -> Self {
        Self {
            guards: default_guards(),
        }
    }

    pub fn with_guards(guards: Vec<Box<dyn StateGuard>>) -> Self {
        Self { guards }
    }

    /// Apply `event` to `record` at time `now` on behalf of `actor`
    pub fn transition(
        &self,
        record: &mut SampleRecord,
        event: &SampleEvent,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> StateMachineResult<SampleStatus> {
        let current = record.sample.status;
        let target = determine_target_state(current, event)?;

        for guard in &self.guards {
            guard.check(&record.sample, event)?;
        }

        Self::stamp(record, current, event, now);

        record.sample.status = target;
        record.sample.updated_by = actor;
        record.sample.updated_at = now;
        record.metadata.updated_by = actor;
        record.metadata.last_updated_at = Some(now);

        debug!(
            sample_id = %record.sample.id,
            order_id = %record.sample.oms_order_id,
            from = %current,
            to = %target,
            event = event.event_type(),
            "Sample transitioned"
        );

        Ok(target)
    }

    fn stamp(
        record: &mut SampleRecord,
        current: SampleStatus,
        event: &SampleEvent,
        now: DateTime<Utc>,
    ) {
        let SampleRecord { sample, metadata } = record;
        match event {
            SampleEvent::MarkCollected { collected_at } => {
                if metadata.collected_at.is_none() {
                    metadata.collected_at = Some(collected_at.unwrap_or(now));
                }
            }
            SampleEvent::ForceCollected { collected_at } => {
                metadata.collected_at = Some(collected_at.unwrap_or(now));
                metadata.collect_later_reason = None;
            }
            SampleEvent::MarkNotCollectedEmedic | SampleEvent::Dispatch => {}
            SampleEvent::Receive => {
                if current != SampleStatus::Received {
                    metadata.received_at = Some(now);
                }
            }
            SampleEvent::Accession => {
                metadata.accessioned_at = Some(now);
            }
            SampleEvent::SyncToLis { visit_id } => {
                sample.visit_id = Some(visit_id.clone());
                sample.lab_id = Some(sample.destination_lab_id);
                metadata.lis_sync_at = Some(now);
            }
            SampleEvent::ResetLisSync => {
                sample.visit_id = None;
                metadata.lis_sync_at = None;
                metadata.received_at = Some(now);
            }
            SampleEvent::Outsource { next_destination } => {
                sample.lab_id = Some(sample.destination_lab_id);
                sample.destination_lab_id = *next_destination;
                metadata.outsourced_at = Some(now);
            }
            SampleEvent::Transfer => {
                sample.lab_id = Some(sample.destination_lab_id);
                metadata.transferred_at = Some(now);
            }
            SampleEvent::FailTransfer => {}
            SampleEvent::Reject {
                reason,
                rejecting_lab,
            } => {
                sample.rejection_reason = Some(reason.clone());
                sample.visit_id = None;
                metadata.lis_sync_at = None;
                metadata.rejected_at = Some(now);
                metadata.rejecting_lab = Some(*rejecting_lab);
            }
            SampleEvent::PartiallyReject {
                reason,
                rejecting_lab,
            } => {
                sample.rejection_reason = Some(reason.clone());
                metadata.rejected_at = Some(now);
                metadata.rejecting_lab = Some(*rejecting_lab);
            }
            SampleEvent::PromoteToRejected => {
                sample.visit_id = None;
                metadata.lis_sync_at = None;
            }
            SampleEvent::MarkNotReceived { reason } => {
                metadata.not_received_at = Some(now);
                metadata.not_received_reason = Some(reason.clone());
            }
            SampleEvent::Delete => {
                sample.deleted_at = Some(now);
                metadata.deleted_at = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabId, NewSample, SampleId, SampleMetadata, VialTypeId};
    use chrono::Duration;

    fn record(status: SampleStatus) -> SampleRecord {
        let sample = NewSample {
            oms_order_id: "O1".to_string(),
            oms_request_id: "R1".to_string(),
            city_code: "BLR".to_string(),
            vial_type_id: VialTypeId(5),
            parent_sample_id: None,
            lab_id: None,
            destination_lab_id: LabId(10),
            status,
            barcode: Some("BC1".to_string()),
            visit_id: None,
            created_by: UserId(1),
        }
        .into_sample(SampleId(1), 1, Utc::now());
        SampleRecord::new(sample, SampleMetadata::for_order("O1", "BLR", 1))
    }

    #[test]
    fn test_collected_at_is_stamped_only_once() {
        let machine = SampleStateMachine::new();
        let mut rec = record(SampleStatus::Default);
        let first = Utc::now() - Duration::hours(2);
        machine
            .transition(
                &mut rec,
                &SampleEvent::MarkCollected {
                    collected_at: Some(first),
                },
                UserId(1),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(rec.sample.status, SampleStatus::CollectionDone);
        assert_eq!(rec.metadata.collected_at, Some(first));

        machine
            .transition(
                &mut rec,
                &SampleEvent::MarkCollected { collected_at: None },
                UserId(1),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(rec.metadata.collected_at, Some(first));
    }

    #[test]
    fn test_received_at_not_reset_on_repeat() {
        let machine = SampleStateMachine::new();
        let mut rec = record(SampleStatus::CollectionDone);
        let t1 = Utc::now();
        machine
            .transition(&mut rec, &SampleEvent::Receive, UserId(2), t1)
            .unwrap();
        let t2 = t1 + Duration::minutes(5);
        machine
            .transition(&mut rec, &SampleEvent::Receive, UserId(2), t2)
            .unwrap();
        assert_eq!(rec.metadata.received_at, Some(t1));
        assert_eq!(rec.sample.updated_at, t2);
    }

    #[test]
    fn test_sync_sets_visit_and_location() {
        let machine = SampleStateMachine::new();
        let mut rec = record(SampleStatus::Received);
        machine
            .transition(
                &mut rec,
                &SampleEvent::SyncToLis {
                    visit_id: "V-1".to_string(),
                },
                UserId(1),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(rec.sample.status, SampleStatus::Synced);
        assert_eq!(rec.sample.visit_id(), Some("V-1"));
        assert_eq!(rec.sample.lab_id, Some(LabId(10)));
        assert!(rec.metadata.lis_sync_at.is_some());
    }

    #[test]
    fn test_outsource_moves_destination() {
        let machine = SampleStateMachine::new();
        let mut rec = record(SampleStatus::Received);
        machine
            .transition(
                &mut rec,
                &SampleEvent::Outsource {
                    next_destination: LabId(77),
                },
                UserId(1),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(rec.sample.lab_id, Some(LabId(10)));
        assert_eq!(rec.sample.destination_lab_id, LabId(77));
        assert!(rec.metadata.outsourced_at.is_some());
    }

    #[test]
    fn test_reject_clears_lis_state() {
        let machine = SampleStateMachine::new();
        let mut rec = record(SampleStatus::Synced);
        rec.sample.visit_id = Some("V-1".to_string());
        rec.metadata.lis_sync_at = Some(Utc::now());
        machine
            .transition(
                &mut rec,
                &SampleEvent::Reject {
                    reason: "Clotted".to_string(),
                    rejecting_lab: LabId(10),
                },
                UserId(1),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(rec.sample.status, SampleStatus::Rejected);
        assert_eq!(rec.sample.visit_id, None);
        assert_eq!(rec.metadata.lis_sync_at, None);
        assert_eq!(rec.metadata.rejecting_lab, Some(LabId(10)));
    }

    #[test]
    fn test_reset_lis_sync_returns_sample_to_desk() {
        let machine = SampleStateMachine::new();
        let mut rec = record(SampleStatus::Received);
        let t0 = Utc::now() - Duration::minutes(10);
        machine
            .transition(
                &mut rec,
                &SampleEvent::SyncToLis {
                    visit_id: "VIS-9".to_string(),
                },
                UserId(2),
                t0,
            )
            .unwrap();

        let now = Utc::now();
        let status = machine
            .transition(&mut rec, &SampleEvent::ResetLisSync, UserId(3), now)
            .unwrap();
        assert_eq!(status, SampleStatus::Received);
        assert_eq!(rec.sample.visit_id, None);
        assert_eq!(rec.metadata.lis_sync_at, None);
        assert_eq!(rec.metadata.received_at, Some(now));

        assert!(!can_transition(
            SampleStatus::Received,
            &SampleEvent::ResetLisSync
        ));
        assert!(!can_transition(
            SampleStatus::Accessioned,
            &SampleEvent::ResetLisSync
        ));
    }

    #[test]
    fn test_transitions_outside_table_fail() {
        assert!(!can_transition(SampleStatus::Default, &SampleEvent::Receive));
        assert!(!can_transition(
            SampleStatus::Synced,
            &SampleEvent::MarkCollected { collected_at: None }
        ));
        assert!(!can_transition(SampleStatus::Deleted, &SampleEvent::Delete));
        assert!(!can_transition(
            SampleStatus::Rejected,
            &SampleEvent::Reject {
                reason: "again".to_string(),
                rejecting_lab: LabId(1)
            }
        ));
        assert!(!can_transition(
            SampleStatus::Received,
            &SampleEvent::PromoteToRejected
        ));
    }

    #[test]
    fn test_guard_failure_leaves_record_untouched() {
        let machine = SampleStateMachine::new();
        let mut rec = record(SampleStatus::Received);
        let before = rec.clone();
        let result = machine.transition(
            &mut rec,
            &SampleEvent::SyncToLis {
                visit_id: String::new(),
            },
            UserId(1),
            Utc::now(),
        );
        assert!(result.is_err());
        assert_eq!(rec, before);
    }
}
