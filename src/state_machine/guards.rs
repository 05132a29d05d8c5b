use super::errors::{business_rule_violation, missing_value, GuardResult};
use super::events::SampleEvent;
use crate::models::Sample;

/// Trait for implementing state transition guards
pub trait StateGuard: Send + Sync {
    /// Check if the event may be applied to the sample
    fn check(&self, sample: &Sample, event: &SampleEvent) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// LIS sync must hand back a visit id
pub struct VisitIdPresentGuard;

impl StateGuard for VisitIdPresentGuard {
    fn check(&self, _sample: &Sample, event: &SampleEvent) -> GuardResult<()> {
        match event {
            SampleEvent::SyncToLis { visit_id } if visit_id.trim().is_empty() => {
                Err(missing_value("visit_id"))
            }
            _ => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "LIS sync requires a visit id"
    }
}

/// Rejection and not-received transitions must record why
pub struct ReasonPresentGuard;

impl StateGuard for ReasonPresentGuard {
    fn check(&self, _sample: &Sample, event: &SampleEvent) -> GuardResult<()> {
        match event.reason() {
            Some(reason) if reason.trim().is_empty() => Err(missing_value("reason")),
            _ => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "Rejection and not-received require a reason"
    }
}

/// Routing away from the current lab needs a real destination
pub struct DestinationKnownGuard;

impl StateGuard for DestinationKnownGuard {
    fn check(&self, sample: &Sample, event: &SampleEvent) -> GuardResult<()> {
        match event {
            SampleEvent::Outsource { next_destination } if next_destination.is_unset() => {
                Err(missing_value("next_destination"))
            }
            SampleEvent::Transfer | SampleEvent::SyncToLis { .. }
                if sample.destination_lab_id.is_unset() =>
            {
                Err(business_rule_violation(format!(
                    "sample {} has no destination lab",
                    sample.id
                )))
            }
            _ => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "Routing requires a destination lab"
    }
}

/// The guards every sample transition runs through
pub fn default_guards() -> Vec<Box<dyn StateGuard>> {
    vec![
        Box::new(VisitIdPresentGuard),
        Box::new(ReasonPresentGuard),
        Box::new(DestinationKnownGuard),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabId, NewSample, SampleId, UserId, VialTypeId};
    use crate::state_machine::SampleStatus;
    use chrono::Utc;

    fn sample(destination: i64) -> Sample {
        NewSample {
            oms_order_id: "O1".to_string(),
            oms_request_id: "R1".to_string(),
            city_code: "BLR".to_string(),
            vial_type_id: VialTypeId(1),
            parent_sample_id: None,
            lab_id: None,
            destination_lab_id: LabId(destination),
            status: SampleStatus::Received,
            barcode: None,
            visit_id: None,
            created_by: UserId(1),
        }
        .into_sample(SampleId(1), 1, Utc::now())
    }

    #[test]
    fn test_guard_descriptions() {
        assert_eq!(
            VisitIdPresentGuard.description(),
            "LIS sync requires a visit id"
        );
        assert_eq!(default_guards().len(), 3);
    }

    #[test]
    fn test_visit_id_guard() {
        let blank = SampleEvent::SyncToLis {
            visit_id: "  ".to_string(),
        };
        assert!(VisitIdPresentGuard.check(&sample(1), &blank).is_err());
        let ok = SampleEvent::SyncToLis {
            visit_id: "V1".to_string(),
        };
        assert!(VisitIdPresentGuard.check(&sample(1), &ok).is_ok());
    }

    #[test]
    fn test_destination_guard() {
        let event = SampleEvent::Outsource {
            next_destination: LabId(0),
        };
        assert!(DestinationKnownGuard.check(&sample(1), &event).is_err());
        assert!(DestinationKnownGuard
            .check(&sample(0), &SampleEvent::Transfer)
            .is_err());
        assert!(DestinationKnownGuard
            .check(&sample(1), &SampleEvent::Transfer)
            .is_ok());
    }
}
