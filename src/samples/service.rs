//! # Sample Service
//!
//! Collector-facing operations on planned samples: marking draws done, attaching
//! barcodes and collection details, and read-only views over an order's samples.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use super::types::{
    AddBarcodesRequest, ForceCollectedRequest, MarkCollectedRequest, SampleDetails, TaskType,
    UpdateTaskSequenceRequest, VisitDetails, VolumeAdded,
};
use crate::constants::{messages, COLLECT_LATER_REQUESTED_REASON, SYSTEM_USER_ID};
use crate::context::LifecycleContext;
use crate::error::{Result, SampleError};
use crate::events::{dispatch_in_background, SampleLifecycleEvent};
use crate::logging::log_sample_operation;
use crate::models::{SampleId, SampleRecord, TestDetailUpdate, TestStatus};
use crate::state_machine::{SampleEvent, SampleStatus};
use crate::store::ChangeSet;

#[derive(Clone)]
pub struct SampleService {
    ctx: Arc<LifecycleContext>,
}

impl SampleService {
    pub fn new(ctx: Arc<LifecycleContext>) -> Self {
        Self { ctx }
    }

    /// Close a collection task: the selected samples move to `CollectionDone`.
    ///
    /// Primary tasks pick up samples still in `Default` and re-confirm ones already
    /// collected; recollection tasks only pick `Default` samples of their task sequence.
    #[instrument(skip(self, request), fields(request_id = %request.oms_request_id, task_type = ?request.task_type))]
    pub async fn mark_samples_collected(
        &self,
        request: MarkCollectedRequest,
    ) -> Result<Vec<SampleRecord>> {
        request.validate()?;
        let samples = self
            .ctx
            .store
            .get_samples_by_request(request.oms_request_id.trim())
            .await?;

        let mut selected: Vec<SampleRecord> = samples
            .into_iter()
            .filter(|r| r.sample.is_root())
            .filter(|r| match request.task_type {
                TaskType::Primary => matches!(
                    r.sample.status,
                    SampleStatus::Default | SampleStatus::CollectionDone
                ),
                TaskType::Recollection => {
                    r.sample.status == SampleStatus::Default
                        && r.metadata.task_sequence == request.task_sequence
                }
            })
            .collect();
        if selected.is_empty() {
            return Err(SampleError::not_found(messages::NO_SAMPLES_TO_COLLECT));
        }

        let now = Utc::now();
        let event = SampleEvent::MarkCollected {
            collected_at: request.collected_at,
        };
        for record in &mut selected {
            self.ctx
                .state_machine
                .transition(record, &event, SYSTEM_USER_ID, now)?;
        }

        for (oms_order_id, records) in group_by_order(&selected) {
            let numbers = sample_numbers(&records);
            let oms_test_ids = self.mapped_test_ids(&oms_order_id, &numbers).await?;

            let mut changes = ChangeSet::for_order(&oms_order_id);
            changes.update_samples(records.iter().map(|r| (*r).clone()));
            self.ctx.store.apply(changes).await?;

            let collected_at = records.iter().find_map(|r| r.metadata.collected_at);
            log_sample_operation(
                "mark_collected",
                Some(&oms_order_id),
                None,
                SampleStatus::CollectionDone.as_str(),
                Some(&format!("{} samples", records.len())),
            );
            if !oms_test_ids.is_empty() {
                dispatch_in_background(
                    self.ctx.events.clone(),
                    SampleLifecycleEvent::SampleCollected {
                        oms_order_id,
                        oms_test_ids,
                        collected_at,
                    },
                );
            }
        }
        Ok(selected)
    }

    /// Override the collection state of specific sample numbers and re-request their tests
    #[instrument(skip(self, request), fields(order_id = %request.oms_order_id))]
    pub async fn force_mark_collected(&self, request: ForceCollectedRequest) -> Result<Vec<SampleRecord>> {
        request.validate()?;
        let oms_order_id = request.oms_order_id.trim();

        let (samples, tests) = tokio::join!(
            self.ctx
                .store
                .get_samples_by_sample_numbers(oms_order_id, &request.sample_numbers),
            self.ctx
                .tests
                .get_tests_by_sample_numbers(oms_order_id, &request.sample_numbers),
        );
        let mut samples: Vec<SampleRecord> =
            samples?.into_iter().filter(|r| r.sample.is_root()).collect();
        if samples.is_empty() {
            return Err(SampleError::not_found(messages::SAMPLES_NOT_FOUND));
        }
        let tests = tests?.tests;

        let collected_at = request.collected_at.unwrap_or_else(Utc::now);
        let event = SampleEvent::ForceCollected {
            collected_at: Some(collected_at),
        };
        let now = Utc::now();
        for record in &mut samples {
            self.ctx
                .state_machine
                .transition(record, &event, request.user_id, now)?;
        }

        let oms_test_ids: Vec<String> = tests.iter().map(|t| t.oms_test_id.clone()).collect();
        let mut changes = ChangeSet::for_order(oms_order_id);
        changes.update_samples(samples.iter().cloned());
        for oms_test_id in &oms_test_ids {
            changes.update_test(TestDetailUpdate::new(oms_test_id).status(TestStatus::Requested));
        }
        self.ctx.store.apply(changes).await?;
        info!(samples = samples.len(), tests = oms_test_ids.len(), "Samples force-marked collected");

        dispatch_in_background(
            self.ctx.events.clone(),
            SampleLifecycleEvent::SampleCollected {
                oms_order_id: oms_order_id.to_string(),
                oms_test_ids,
                collected_at: Some(collected_at),
            },
        );
        Ok(samples)
    }

    /// Attach barcodes or collect-later reasons and derive the resulting test statuses
    #[instrument(skip(self, request), fields(accessions = request.accessions.len()))]
    pub async fn add_barcode_details(
        &self,
        request: AddBarcodesRequest,
    ) -> Result<BTreeMap<String, TestStatus>> {
        request.validate()?;

        let barcodes = request.barcodes();
        if !barcodes.is_empty() {
            let owners: HashMap<SampleId, Option<&str>> = request
                .accessions
                .iter()
                .map(|a| (a.sample_id, a.barcode()))
                .collect();
            let taken = self.ctx.store.find_existing_barcodes(&barcodes).await?;
            if let Some((barcode, holder)) = taken
                .iter()
                .find(|(barcode, holder)| owners.get(holder) != Some(&Some(barcode.as_str())))
            {
                debug!(barcode = %barcode, holder = %holder, "Barcode already assigned");
                return Err(SampleError::conflict(messages::DUPLICATE_BARCODE));
            }
        }

        let ids: Vec<SampleId> = request.accessions.iter().map(|a| a.sample_id).collect();
        let mut samples: HashMap<SampleId, SampleRecord> = self
            .ctx
            .store
            .get_samples_by_ids(&ids)
            .await?
            .into_iter()
            .map(|r| (r.id(), r))
            .collect();
        if ids.iter().any(|id| !samples.contains_key(id)) {
            return Err(SampleError::not_found(messages::SAMPLES_NOT_FOUND));
        }

        let now = Utc::now();
        let mut statuses: BTreeMap<String, TestStatus> = BTreeMap::new();
        let mut per_order: BTreeMap<String, (Vec<SampleRecord>, BTreeMap<String, TestStatus>)> =
            BTreeMap::new();
        for accession in &request.accessions {
            let Some(mut record) = samples.remove(&accession.sample_id) else {
                continue;
            };
            record.sample.barcode = accession.barcode().map(str::to_string);
            record.sample.updated_by = SYSTEM_USER_ID;
            record.sample.updated_at = now;
            record.metadata.barcode_image_url =
                Some(accession.barcode_image_url.trim().to_string()).filter(|u| !u.is_empty());
            record.metadata.barcode_scanned_at = accession.barcode_scanned_at;
            record.metadata.collect_later_reason =
                accession.collect_later_reason().map(str::to_string);
            record.metadata.last_updated_at = Some(now);
            record.metadata.updated_by = SYSTEM_USER_ID;

            let status = match accession.collect_later_reason() {
                None | Some(COLLECT_LATER_REQUESTED_REASON) => TestStatus::Requested,
                Some(_) => TestStatus::CollectSampleLater,
            };
            let tests = self
                .ctx
                .tests
                .get_tests_by_sample_numbers(&record.sample.oms_order_id, &[record.sample.sample_number])
                .await?
                .tests;

            let entry = per_order
                .entry(record.sample.oms_order_id.clone())
                .or_default();
            for test in tests {
                statuses.insert(test.oms_test_id.clone(), status);
                entry.1.insert(test.oms_test_id, status);
            }
            entry.0.push(record);
        }

        for (oms_order_id, (records, test_statuses)) in per_order {
            let mut changes = ChangeSet::for_order(&oms_order_id);
            changes.update_samples(records);
            for (oms_test_id, status) in test_statuses {
                changes.update_test(TestDetailUpdate::new(oms_test_id).status(status));
            }
            self.ctx.store.apply(changes).await?;
        }
        info!(tests = statuses.len(), "Barcode details saved");
        Ok(statuses)
    }

    #[instrument(skip(self))]
    pub async fn add_collected_volume(&self, sample_id: SampleId, volume: i32) -> Result<VolumeAdded> {
        if sample_id.is_unset() {
            return Err(SampleError::validation(messages::SAMPLE_ID_REQUIRED));
        }
        let mut record = self.ctx.store.get_sample(sample_id).await?;
        record.metadata.collected_volume = Some(volume);
        record.metadata.last_updated_at = Some(Utc::now());

        let added = VolumeAdded {
            oms_request_id: record.sample.oms_request_id.clone(),
            oms_order_id: record.sample.oms_order_id.clone(),
        };
        let mut changes = ChangeSet::for_order(&added.oms_order_id);
        changes.update_sample(record);
        self.ctx.store.apply(changes).await?;
        Ok(added)
    }

    /// Stamp `task_id` as the task sequence of the samples carrying the given tests
    #[instrument(skip(self, request), fields(request_id = %request.oms_request_id, task_id = request.task_id))]
    pub async fn update_task_sequence_for_sample(
        &self,
        request: UpdateTaskSequenceRequest,
    ) -> Result<usize> {
        request.validate()?;
        let wanted: HashSet<&str> = request.oms_test_ids.iter().map(String::as_str).collect();
        let samples = self
            .ctx
            .store
            .get_samples_by_request(request.oms_request_id.trim())
            .await?;

        let mut updated = 0;
        for (oms_order_id, records) in group_by_order(&samples) {
            let mappings = self
                .ctx
                .store
                .get_mappings_by_sample_numbers(&oms_order_id, &sample_numbers(&records))
                .await?;
            let numbers: HashSet<i32> = mappings
                .iter()
                .filter(|m| wanted.contains(m.oms_test_id.as_str()))
                .map(|m| m.sample_number)
                .collect();

            let mut changes = ChangeSet::for_order(&oms_order_id);
            for record in records
                .into_iter()
                .filter(|r| numbers.contains(&r.sample.sample_number))
            {
                let mut record = record.clone();
                record.metadata.task_sequence = Some(request.task_id);
                changes.update_sample(record);
                updated += 1;
            }
            if !changes.is_empty() {
                self.ctx.store.apply(changes).await?;
            }
        }
        debug!(samples = updated, "Task sequence updated");
        Ok(updated)
    }

    /// Distinct LIS visits of an order, in sample-number order
    pub async fn get_visit_details_for_task(&self, oms_order_id: &str) -> Result<Vec<VisitDetails>> {
        let mut samples = self.ctx.store.get_samples_by_order(oms_order_id).await?;
        samples.sort_by_key(|r| (r.sample.sample_number, r.sample.id));

        let mut seen = HashSet::new();
        Ok(samples
            .iter()
            .filter_map(|r| {
                let visit_id = r.sample.visit_id()?;
                seen.insert(visit_id.to_string()).then(|| VisitDetails {
                    visit_id: visit_id.to_string(),
                    lab_id: r.sample.lab_id,
                    collected_at: r.metadata.collected_at,
                    received_at: r.metadata.received_at,
                })
            })
            .collect())
    }

    pub async fn is_sample_collected(&self, oms_order_id: &str) -> Result<bool> {
        Ok(self
            .ctx
            .store
            .get_samples_by_order(oms_order_id)
            .await?
            .iter()
            .any(|r| r.sample.status.is_collected()))
    }

    pub async fn get_sample_details(&self, oms_order_id: &str) -> Result<SampleDetails> {
        if oms_order_id.trim().is_empty() {
            return Err(SampleError::validation(messages::ORDER_ID_REQUIRED));
        }
        let (samples, mappings) = tokio::join!(
            self.ctx.store.get_samples_by_order(oms_order_id),
            self.ctx.store.get_mappings_by_order(oms_order_id),
        );
        Ok(SampleDetails {
            samples: samples?,
            mappings: mappings?,
        })
    }

    async fn mapped_test_ids(&self, oms_order_id: &str, numbers: &[i32]) -> Result<Vec<String>> {
        let ids: BTreeSet<String> = self
            .ctx
            .store
            .get_mappings_by_sample_numbers(oms_order_id, numbers)
            .await?
            .into_iter()
            .map(|m| m.oms_test_id)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

fn group_by_order(records: &[SampleRecord]) -> BTreeMap<String, Vec<&SampleRecord>> {
    let mut grouped: BTreeMap<String, Vec<&SampleRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.sample.oms_order_id.clone())
            .or_default()
            .push(record);
    }
    grouped
}

fn sample_numbers(records: &[&SampleRecord]) -> Vec<i32> {
    records
        .iter()
        .map(|r| r.sample.sample_number)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
