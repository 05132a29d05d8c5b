//! # Rejection Service
//!
//! Full rejection works on every sample sharing a barcode (the parent and its
//! derivatives). Partial rejection works on one test of one sample number and promotes
//! the samples to `Rejected` once no mapping on that number survives.
//!
//! LIS visits are cancelled before anything is written; a cancellation failure aborts
//! the rejection. Tickets and downstream events are dispatched after commit and never
//! fail the call.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use super::types::{PartialRejectionRequest, RejectSampleRequest, RejectionOutcome};
use crate::clients::SupportTicket;
use crate::constants::{messages, ticket_subjects, SYSTEM_USER_ID};
use crate::context::LifecycleContext;
use crate::error::{Result, SampleError};
use crate::events::{dispatch_all_in_background, SampleLifecycleEvent};
use crate::models::{MappingSelector, TestStatus};
use crate::state_machine::{SampleEvent, SampleStatus};
use crate::store::ChangeSet;

pub const ACTIVITY_SAMPLE_REJECTED: &str = "sample_rejected";
pub const ACTIVITY_SAMPLE_PARTIALLY_REJECTED: &str = "sample_partially_rejected";

#[derive(Clone)]
pub struct RejectionService {
    ctx: Arc<LifecycleContext>,
}

impl RejectionService {
    pub fn new(ctx: Arc<LifecycleContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(barcode = %request.barcode, lab_id = %request.lab_id))]
    pub async fn reject_by_barcode(&self, request: RejectSampleRequest) -> Result<RejectionOutcome> {
        request.validate()?;
        let barcode = request.barcode.trim();
        let reason = request.reason.trim().to_string();

        let samples = self.ctx.store.get_samples_by_barcode(barcode, &[]).await?;
        if samples.is_empty() {
            return Err(SampleError::not_found(messages::BARCODE_NOT_FOUND));
        }
        if samples
            .iter()
            .all(|s| s.sample.status == SampleStatus::Rejected)
        {
            return Err(SampleError::conflict(messages::SAMPLE_ALREADY_REJECTED));
        }
        let mut samples: Vec<_> = samples
            .into_iter()
            .filter(|s| s.sample.status != SampleStatus::Rejected)
            .collect();

        let first = &samples[0].sample;
        let oms_order_id = first.oms_order_id.clone();
        let tests = self
            .ctx
            .tests
            .get_tests_by_sample_numbers(&oms_order_id, &[first.sample_number])
            .await?
            .tests;
        let oms_test_ids: Vec<String> = tests.iter().map(|t| t.oms_test_id.clone()).collect();

        for record in &samples {
            if let Some(visit_id) = record.sample.visit_id() {
                self.ctx
                    .lis
                    .cancel_lis_sync_data(&tests, visit_id, record)
                    .await?;
                debug!(sample_id = %record.id(), visit_id = %visit_id, "Cancelled LIS visit");
            }
        }

        let now = Utc::now();
        let event = SampleEvent::Reject {
            reason: reason.clone(),
            rejecting_lab: request.lab_id,
        };
        let mut changes = ChangeSet::for_order(&oms_order_id);
        for record in &mut samples {
            self.ctx
                .state_machine
                .transition(record, &event, request.user_id, now)?;
            changes.reject_mappings(MappingSelector::BySample(record.id()), Some(reason.clone()));
        }
        changes.update_samples(samples.iter().cloned());
        self.ctx.store.apply(changes).await?;
        info!(order_id = %oms_order_id, samples = samples.len(), "Samples rejected");

        for record in samples.iter().filter(|r| r.sample.is_root()) {
            self.raise_ticket(
                &oms_order_id,
                ticket_subjects::FULL_REJECTION,
                &reason,
                oms_test_ids.clone(),
            );
            dispatch_all_in_background(
                self.ctx.events.clone(),
                vec![
                    SampleLifecycleEvent::UpdateTestStatus {
                        oms_order_id: oms_order_id.clone(),
                        oms_test_ids: oms_test_ids.clone(),
                        status: TestStatus::Requested,
                        check_order_completion: true,
                    },
                    SampleLifecycleEvent::ResetTats {
                        oms_order_id: oms_order_id.clone(),
                        oms_test_ids: oms_test_ids.clone(),
                    },
                    SampleLifecycleEvent::AddRejectedTag {
                        oms_order_id: oms_order_id.clone(),
                        oms_test_ids: oms_test_ids.clone(),
                        reason: reason.clone(),
                    },
                    SampleLifecycleEvent::TestTrackingUpdate {
                        oms_order_id: oms_order_id.clone(),
                        oms_test_ids: oms_test_ids.clone(),
                        sample_id: Some(record.id()),
                        activity: ACTIVITY_SAMPLE_REJECTED.to_string(),
                    },
                ],
            );
        }

        Ok(RejectionOutcome {
            oms_order_id,
            oms_test_ids,
        })
    }

    #[instrument(
        skip(self, request),
        fields(order_id = %request.oms_order_id, sample_number = request.sample_number, test_id = %request.oms_test_id)
    )]
    pub async fn partially_reject(
        &self,
        request: PartialRejectionRequest,
    ) -> Result<RejectionOutcome> {
        request.validate()?;
        let oms_order_id = request.oms_order_id.trim().to_string();
        let oms_test_id = request.oms_test_id.trim().to_string();
        let reason = request.reason.trim().to_string();

        let mut samples = self
            .ctx
            .store
            .get_samples_by_sample_numbers(&oms_order_id, &[request.sample_number])
            .await?;
        if samples.is_empty() {
            return Err(SampleError::not_found(messages::SAMPLES_NOT_FOUND));
        }
        let mapping = self
            .ctx
            .store
            .get_mappings_by_sample_numbers(&oms_order_id, &[request.sample_number])
            .await?
            .into_iter()
            .find(|m| m.oms_test_id == oms_test_id)
            .ok_or_else(|| SampleError::not_found(messages::TEST_NOT_MAPPED_TO_SAMPLE))?;
        if mapping.is_rejected {
            return Err(SampleError::conflict(messages::TEST_ALREADY_REJECTED));
        }
        let test = self
            .ctx
            .tests
            .get_tests_by_oms_test_ids(std::slice::from_ref(&oms_test_id))
            .await?
            .into_iter()
            .find(|t| t.oms_order_id == oms_order_id)
            .ok_or_else(|| SampleError::not_found(format!("test {oms_test_id} not found")))?;

        let synced = samples
            .iter()
            .find_map(|r| r.sample.visit_id().map(|visit_id| (r, visit_id)));
        if let Some((record, visit_id)) = synced {
            self.ctx
                .lis
                .cancel_lis_sync_data(std::slice::from_ref(&test), visit_id, record)
                .await?;
        }

        let now = Utc::now();
        let event = SampleEvent::PartiallyReject {
            reason: reason.clone(),
            rejecting_lab: request.lab_id,
        };
        for record in &mut samples {
            self.ctx
                .state_machine
                .transition(record, &event, request.user_id, now)?;
        }
        let mut changes = ChangeSet::for_order(&oms_order_id);
        changes.update_samples(samples.iter().cloned());
        changes.reject_mappings(
            MappingSelector::ByTestAndSampleNumber {
                oms_order_id: oms_order_id.clone(),
                oms_test_id: oms_test_id.clone(),
                sample_number: request.sample_number,
            },
            Some(reason.clone()),
        );
        self.ctx.store.apply(changes).await?;

        let oms_test_ids = vec![oms_test_id];
        let root_id = samples
            .iter()
            .find(|r| r.sample.is_root())
            .map(|r| r.id());
        dispatch_all_in_background(
            self.ctx.events.clone(),
            vec![
                SampleLifecycleEvent::ResetTats {
                    oms_order_id: oms_order_id.clone(),
                    oms_test_ids: oms_test_ids.clone(),
                },
                SampleLifecycleEvent::TestTrackingUpdate {
                    oms_order_id: oms_order_id.clone(),
                    oms_test_ids: oms_test_ids.clone(),
                    sample_id: root_id,
                    activity: ACTIVITY_SAMPLE_PARTIALLY_REJECTED.to_string(),
                },
            ],
        );
        self.raise_ticket(
            &oms_order_id,
            ticket_subjects::PARTIAL_REJECTION,
            &reason,
            oms_test_ids.clone(),
        );

        let mappings = self
            .ctx
            .store
            .get_mappings_by_sample_numbers(&oms_order_id, &[request.sample_number])
            .await?;
        if !mappings.is_empty() && mappings.iter().all(|m| m.is_rejected) {
            let promoted_at = Utc::now();
            for record in &mut samples {
                self.ctx.state_machine.transition(
                    record,
                    &SampleEvent::PromoteToRejected,
                    SYSTEM_USER_ID,
                    promoted_at,
                )?;
            }
            let mut promotion = ChangeSet::for_order(&oms_order_id);
            promotion.update_samples(samples.iter().cloned());
            self.ctx.store.apply(promotion).await?;
            info!(samples = samples.len(), "Every test rejected, sample promoted to rejected");
        }

        dispatch_all_in_background(
            self.ctx.events.clone(),
            vec![SampleLifecycleEvent::AddRejectedTag {
                oms_order_id: oms_order_id.clone(),
                oms_test_ids: oms_test_ids.clone(),
                reason,
            }],
        );

        Ok(RejectionOutcome {
            oms_order_id,
            oms_test_ids,
        })
    }

    fn raise_ticket(&self, oms_order_id: &str, subject: &str, reason: &str, oms_test_ids: Vec<String>) {
        if oms_test_ids.is_empty() {
            return;
        }
        if self.ctx.config.rejection.is_ticket_suppressed(reason) {
            debug!(order_id = %oms_order_id, reason = %reason, "Ticket suppressed for reason");
            return;
        }
        let tickets = self.ctx.tickets.clone();
        let ticket = SupportTicket {
            oms_order_id: oms_order_id.to_string(),
            subject: subject.to_string(),
            reason: reason.to_string(),
            oms_test_ids,
        };
        tokio::spawn(async move {
            let order_id = ticket.oms_order_id.clone();
            if let Err(e) = tickets.create_ticket(ticket).await {
                error!(order_id = %order_id, error = %e, "Failed to create rejection ticket");
            }
        });
    }
}
