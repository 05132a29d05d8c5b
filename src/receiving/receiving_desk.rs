//! # Receiving Desk
//!
//! Accepts collected samples at a lab and routes each one onward.
//!
//! ## Per-order procedure
//!
//! Every order of a batch is processed on its own task while holding the order's
//! [`IdempotencyGuard`](crate::guard::IdempotencyGuard) marker:
//!
//! 1. **Phase 1** stamps every pending sample `Received` and commits.
//! 2. **Phase 2** syncs in-house samples to the LIS, outsources or transfers the rest,
//!    creates interlab derivatives and assigns the order's task, all in one commit.
//!
//! A failure after phase 1 leaves the samples `Received` but unrouted. Re-running the
//! receive converges from there: routed samples are skipped and derivatives are only
//! created for parents that have none.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::routing::{classify, sample_number_routes, tests_for_samples, RoutedSamples};
use super::types::{
    CollectedSample, CollectedSamplesRequest, CollectedSamplesResponse, LabSummary,
    MarkNotReceivedRequest, OrderFailure, PatientSummary, ReceiveSamplesRequest, ReceiveSummary,
    SearchType, TestSummary,
};
use crate::clients::LisSyncRequest;
use crate::concurrency::{spawn_all, JoinErrors};
use crate::constants::{
    messages, scanned_at_incorrect_lab, BARCODE_LOOKUP_STATUSES, COLLECTED_LISTING_STATUSES,
};
use crate::context::LifecycleContext;
use crate::error::{Result, SampleError};
use crate::events::{dispatch_all_in_background, SampleLifecycleEvent};
use crate::interlab::{get_interlab_samples_by_parent, plan_derivatives};
use crate::lookups::TestsWithMappings;
use crate::models::{
    LabId, MasterTest, MasterTestId, NewTask, OrderDetails, SampleId, SampleRecord,
    TestDetailUpdate, TestStatus, UserId,
};
use crate::state_machine::SampleEvent;
use crate::store::{ChangeSet, TaskRef};

#[derive(Clone)]
pub struct ReceivingDesk {
    ctx: Arc<LifecycleContext>,
}

impl ReceivingDesk {
    pub fn new(ctx: Arc<LifecycleContext>) -> Self {
        Self { ctx }
    }

    /// Samples of one order that `lab_id` is waiting for, one entry per sample and
    /// processing lab of its tests.
    #[instrument(skip(self, request), fields(lab_id = %request.lab_id, search_type = %request.search_type))]
    pub async fn get_collected_samples(
        &self,
        request: CollectedSamplesRequest,
    ) -> Result<CollectedSamplesResponse> {
        let (search_type, value) = request.validate()?;
        let lab_id = request.lab_id;
        let order = self.resolve_order(search_type, value, lab_id).await?;

        let samples = self
            .ctx
            .store
            .get_collected_samples(&order.oms_order_id, lab_id, &COLLECTED_LISTING_STATUSES)
            .await?;
        if samples.is_empty() {
            if order.is_trf_order() {
                return Err(SampleError::not_found(messages::TRF_NOT_DIGITIZED));
            }
            debug!(order_id = %order.oms_order_id, "No collected samples for lab");
            return Ok(CollectedSamplesResponse::default());
        }

        let numbers = sample_numbers(&samples);
        let (patient, tests, labs) = tokio::join!(
            self.ctx.patients.get_patient_details(order.patient_details_id),
            self.ctx
                .tests
                .get_tests_by_sample_numbers(&order.oms_order_id, &numbers),
            self.ctx.master_data.get_lab_directory(),
        );
        let mut errors = JoinErrors::new();
        let patient = errors.record("patient_details", patient);
        let tests = errors.record("test_details", tests);
        let labs = errors.record("lab_directory", labs);
        errors.into_result()?;
        let (Some(patient), Some(tests), Some(labs)) = (patient, tests, labs) else {
            return Err(SampleError::internal("collected samples lookup returned no value"));
        };

        let patient = PatientSummary {
            age: patient.age_years(Utc::now().date_naive()),
            name: patient.name,
            dob: patient.dob,
            expected_dob: patient.expected_dob,
            gender: patient.gender,
        };

        let mut collected_samples = Vec::new();
        for record in &samples {
            let mut by_lab: BTreeMap<LabId, Vec<TestSummary>> = BTreeMap::new();
            for test in tests_for_samples(&tests, std::slice::from_ref(record)) {
                by_lab
                    .entry(test.processing_lab_id)
                    .or_default()
                    .push(TestSummary {
                        oms_test_id: test.oms_test_id.clone(),
                        test_name: test.test_name.clone(),
                        processing_lab_id: test.processing_lab_id,
                    });
            }

            for (processing_lab_id, lab_tests) in by_lab {
                collected_samples.push(CollectedSample {
                    id: record.sample.id,
                    parent_sample_id: record.sample.parent_sample_id,
                    oms_order_id: record.sample.oms_order_id.clone(),
                    oms_request_id: record.sample.oms_request_id.clone(),
                    city_code: record.sample.city_code.clone(),
                    barcode: record.sample.barcode.clone(),
                    trf_id: order.trf_id.clone(),
                    vial_type_id: record.sample.vial_type_id,
                    sample_number: record.sample.sample_number,
                    status: record.sample.status,
                    collect_later_reason: record.metadata.collect_later_reason.clone(),
                    not_received_reason: record.metadata.not_received_reason.clone(),
                    patient: patient.clone(),
                    tests: lab_tests,
                    lab: LabSummary {
                        id: processing_lab_id,
                        name: labs.name(processing_lab_id).to_string(),
                        lab_type: labs.lab_type(processing_lab_id, lab_id),
                    },
                });
            }
        }

        Ok(CollectedSamplesResponse { collected_samples })
    }

    async fn resolve_order(
        &self,
        search_type: SearchType,
        value: &str,
        lab_id: LabId,
    ) -> Result<OrderDetails> {
        match search_type {
            SearchType::OrderId => self.order_or_not_found(value).await,
            SearchType::TrfId => self
                .ctx
                .orders
                .get_order_by_trf_id(value)
                .await?
                .ok_or_else(|| SampleError::not_found(messages::TRF_NOT_FOUND)),
            SearchType::Barcode => {
                let samples = self
                    .ctx
                    .store
                    .get_samples_by_barcode(value, &BARCODE_LOOKUP_STATUSES)
                    .await?;
                // A parent and its derivative share the barcode; prefer the one headed here
                let sample = samples
                    .iter()
                    .find(|s| s.sample.destination_lab_id == lab_id)
                    .or_else(|| samples.first())
                    .ok_or_else(|| SampleError::not_found(messages::BARCODE_NOT_FOUND))?;

                let destination = sample.sample.destination_lab_id;
                if destination != lab_id {
                    let labs = self.ctx.master_data.get_lab_directory().await?;
                    if labs.is_inhouse(destination) {
                        return Err(SampleError::validation(scanned_at_incorrect_lab(
                            labs.name(destination),
                        )));
                    }
                }
                self.order_or_not_found(&sample.sample.oms_order_id).await
            }
        }
    }

    async fn order_or_not_found(&self, oms_order_id: &str) -> Result<OrderDetails> {
        self.ctx
            .orders
            .get_order_by_oms_order_id(oms_order_id)
            .await?
            .ok_or_else(|| SampleError::not_found(messages::ORDER_NOT_FOUND))
    }

    /// Receive a batch of samples at `receiving_lab_id`.
    ///
    /// Batch-level problems (validation, duplicate barcodes, unknown samples) fail the
    /// whole call. Past that point each order succeeds or fails on its own and the
    /// outcome is reported in the returned [`ReceiveSummary`].
    #[instrument(
        skip(self, request),
        fields(lab_id = %request.receiving_lab_id, samples = request.samples.len())
    )]
    pub async fn receive_and_sync_samples(
        &self,
        request: ReceiveSamplesRequest,
    ) -> Result<ReceiveSummary> {
        request.validate()?;
        let session_lab_id = request.receiving_lab_id;
        let user_id = request.user_id;

        let mut barcodes: HashMap<SampleId, String> = HashMap::new();
        let mut holders: HashMap<String, SampleId> = HashMap::new();
        for item in &request.samples {
            let barcode = item.barcode.trim().to_string();
            if let Some(other) = holders.insert(barcode.clone(), item.sample_id) {
                if other != item.sample_id {
                    return Err(SampleError::conflict(messages::DUPLICATE_BARCODE));
                }
            }
            barcodes.insert(item.sample_id, barcode);
        }

        let mut ids: Vec<SampleId> = barcodes.keys().copied().collect();
        ids.sort();
        let records = self.ctx.store.get_samples_by_ids(&ids).await?;
        let found: BTreeSet<SampleId> = records.iter().map(SampleRecord::id).collect();
        let missing: Vec<SampleId> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
        if records.is_empty() || !missing.is_empty() {
            warn!(missing = ?missing, "Receive batch names unknown samples");
            return Err(SampleError::not_found(messages::SAMPLES_NOT_FOUND));
        }
        self.ensure_barcodes_available(&records, &barcodes).await?;

        let mut orders: BTreeMap<String, Vec<SampleId>> = BTreeMap::new();
        for record in &records {
            if record.sample.oms_order_id.is_empty() {
                continue;
            }
            orders
                .entry(record.sample.oms_order_id.clone())
                .or_default()
                .push(record.id());
        }
        if orders.is_empty() {
            return Err(SampleError::not_found(messages::NO_ORDERS_FOUND));
        }
        if orders.len() > 1 && !self.ctx.config.receiving.multi_order_receiving_enabled {
            return Err(SampleError::validation(messages::MULTI_ORDER_DISABLED));
        }

        let barcodes = Arc::new(barcodes);
        let branches = orders.into_iter().map(|(order_id, sample_ids)| {
            let desk = self.clone();
            let barcodes = barcodes.clone();
            let label = order_id.clone();
            let branch = async move {
                desk.receive_order(&order_id, &sample_ids, &barcodes, session_lab_id, user_id)
                    .await
            };
            (label, branch)
        });
        let (succeeded, errors) = spawn_all(branches).await;

        let summary = ReceiveSummary {
            succeeded: succeeded.into_iter().map(|(order_id, ())| order_id).collect(),
            failures: errors
                .into_failures()
                .into_iter()
                .map(|failure| OrderFailure {
                    order_id: failure.label,
                    error: failure.error,
                })
                .collect(),
        };
        for failure in &summary.failures {
            warn!(order_id = %failure.order_id, error = %failure.error, "Receiving failed for order");
        }
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failures.len(),
            "Receive batch finished"
        );
        Ok(summary)
    }

    /// Any submitted barcode that is new for its sample must not be held elsewhere
    async fn ensure_barcodes_available(
        &self,
        records: &[SampleRecord],
        barcodes: &HashMap<SampleId, String>,
    ) -> Result<()> {
        let new_barcodes: Vec<String> = records
            .iter()
            .filter_map(|record| {
                let submitted = barcodes.get(&record.id())?;
                (record.sample.barcode() != Some(submitted.as_str())).then(|| submitted.clone())
            })
            .collect();
        if new_barcodes.is_empty() {
            return Ok(());
        }

        let existing = self.ctx.store.find_existing_barcodes(&new_barcodes).await?;
        if let Some((barcode, holder)) = existing.first() {
            debug!(barcode = %barcode, holder = %holder, "Barcode already assigned");
            return Err(SampleError::conflict(messages::DUPLICATE_BARCODE));
        }
        Ok(())
    }

    async fn receive_order(
        &self,
        oms_order_id: &str,
        sample_ids: &[SampleId],
        barcodes: &HashMap<SampleId, String>,
        session_lab_id: LabId,
        user_id: UserId,
    ) -> Result<()> {
        let lock = self.ctx.receive_guard().acquire(oms_order_id).await?;
        let result = self
            .route_order(oms_order_id, sample_ids, barcodes, session_lab_id, user_id)
            .await;
        if let Err(e) = lock.release().await {
            warn!(order_id = %oms_order_id, error = %e, "Failed to release order lock");
        }
        result
    }

    #[instrument(skip(self, sample_ids, barcodes), fields(order_id = %oms_order_id, lab_id = %session_lab_id))]
    async fn route_order(
        &self,
        oms_order_id: &str,
        sample_ids: &[SampleId],
        barcodes: &HashMap<SampleId, String>,
        session_lab_id: LabId,
        user_id: UserId,
    ) -> Result<()> {
        let order = self.order_or_not_found(oms_order_id).await?;

        let mut pending: Vec<SampleRecord> = self
            .ctx
            .store
            .get_samples_by_ids(sample_ids)
            .await?
            .into_iter()
            .filter(|record| !record.sample.status.is_routed())
            .collect();
        if pending.is_empty() {
            info!("All samples already routed");
            return Ok(());
        }
        for record in &mut pending {
            if let Some(barcode) = barcodes.get(&record.id()) {
                record.sample.barcode = Some(barcode.clone());
            }
        }

        let numbers = sample_numbers(&pending);
        let (tests, labs) = tokio::join!(
            self.ctx.tests.get_tests_by_sample_numbers(oms_order_id, &numbers),
            self.ctx.master_data.get_lab_directory(),
        );
        let mut errors = JoinErrors::new();
        let tests = errors.record("test_details", tests);
        let labs = errors.record("lab_directory", labs);
        errors.into_result()?;
        let (Some(tests), Some(labs)) = (tests, labs) else {
            return Err(SampleError::internal("routing lookup returned no value"));
        };
        let master_ids: BTreeSet<MasterTestId> =
            tests.tests.iter().map(|t| t.master_test_id).collect();
        let master_tests = self
            .ctx
            .master_data
            .get_master_tests_by_ids(&master_ids.into_iter().collect::<Vec<_>>())
            .await?;

        let routes = sample_number_routes(&tests, session_lab_id);

        let received_at = Utc::now();
        for record in &mut pending {
            self.ctx
                .state_machine
                .transition(record, &SampleEvent::Receive, user_id, received_at)?;
        }
        let mut received = ChangeSet::for_order(oms_order_id);
        received.update_samples(pending.iter().cloned());
        self.ctx.store.apply(received).await?;
        info!(samples = pending.len(), "Samples received");

        let routed = classify(pending, &routes, &labs, session_lab_id);
        for record in &routed.unrouted {
            warn!(sample_id = %record.id(), "Received sample has no mapped test to route by");
        }
        if !routed.has_routable() {
            return Ok(());
        }

        let routed_at = Utc::now();
        let counts = (routed.inhouse.len(), routed.outsource.len(), routed.interlab.len());
        let RoutedSamples {
            inhouse,
            outsource,
            interlab,
            ..
        } = routed;
        let mut changes = ChangeSet::for_order(oms_order_id);

        let inhouse_test_ids = if inhouse.is_empty() {
            Vec::new()
        } else {
            self.sync_inhouse(
                &order,
                inhouse,
                &tests,
                barcodes,
                session_lab_id,
                user_id,
                routed_at,
                &mut changes,
            )
            .await?
        };
        self.outsource(outsource, &routes, user_id, routed_at, &mut changes)?;
        if !interlab.is_empty() {
            self.transfer_interlab(
                interlab,
                &routes,
                &tests,
                &master_tests,
                user_id,
                routed_at,
                &mut changes,
            )
            .await?;
        }

        let applied = self.ctx.store.apply(changes).await?;
        info!(
            inhouse = counts.0,
            outsource = counts.1,
            interlab = counts.2,
            derivatives = applied.created_samples.len(),
            task_id = ?applied.task_id,
            "Samples routed"
        );

        self.spawn_lab_eta_update(oms_order_id, inhouse_test_ids, routed_at, session_lab_id);
        Ok(())
    }

    /// Register the in-house samples with the LIS and queue the task assignment.
    ///
    /// Returns the tests the session lab now processes.
    #[allow(clippy::too_many_arguments)]
    async fn sync_inhouse(
        &self,
        order: &OrderDetails,
        mut samples: Vec<SampleRecord>,
        tests: &TestsWithMappings,
        barcodes: &HashMap<SampleId, String>,
        session_lab_id: LabId,
        user_id: UserId,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> Result<Vec<String>> {
        let request = LisSyncRequest {
            oms_order_id: order.oms_order_id.clone(),
            lab_id: session_lab_id,
            samples: samples.clone(),
            barcodes: samples
                .iter()
                .filter_map(|r| barcodes.get(&r.id()).map(|b| (r.id(), b.clone())))
                .collect(),
        };
        let visit_id = self.ctx.lis.sync_data_to_lis(request).await?;
        debug!(visit_id = %visit_id, samples = samples.len(), "Synced samples to LIS");

        let event = SampleEvent::SyncToLis { visit_id };
        for record in &mut samples {
            self.ctx
                .state_machine
                .transition(record, &event, user_id, now)?;
        }

        let test_ids: Vec<String> = tests_for_samples(tests, &samples)
            .into_iter()
            .filter(|t| t.processing_lab_id == session_lab_id)
            .map(|t| t.oms_test_id.clone())
            .collect();

        let task = match self
            .ctx
            .tasks
            .get_task_by_oms_order_id(&order.oms_order_id)
            .await?
        {
            Some(task) => TaskRef::Existing(task.id),
            None => TaskRef::New(NewTask::for_order(order)),
        };
        changes.update_samples(samples);
        changes.assign_task(task, test_ids.clone());
        Ok(test_ids)
    }

    fn outsource(
        &self,
        mut samples: Vec<SampleRecord>,
        routes: &BTreeMap<i32, LabId>,
        user_id: UserId,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        for record in &mut samples {
            let next_destination = routes
                .get(&record.sample.sample_number)
                .copied()
                .unwrap_or_default();
            self.ctx.state_machine.transition(
                record,
                &SampleEvent::Outsource { next_destination },
                user_id,
                now,
            )?;
        }
        changes.update_samples(samples);
        Ok(())
    }

    /// Mark parents transferred, plan their derivatives and move the tests on to the
    /// lab each sister lab hands them to.
    #[allow(clippy::too_many_arguments)]
    async fn transfer_interlab(
        &self,
        mut samples: Vec<SampleRecord>,
        routes: &BTreeMap<i32, LabId>,
        tests: &TestsWithMappings,
        master_tests: &HashMap<MasterTestId, MasterTest>,
        user_id: UserId,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        for record in &mut samples {
            self.ctx
                .state_machine
                .transition(record, &SampleEvent::Transfer, user_id, now)?;
        }

        let mut parents = Vec::with_capacity(samples.len());
        for record in &samples {
            let existing = get_interlab_samples_by_parent(&self.ctx.store, record.id()).await?;
            if existing.is_empty() {
                parents.push(record.clone());
            } else {
                debug!(sample_id = %record.id(), "Derivative already exists");
            }
        }
        if !parents.is_empty() {
            let destinations: HashMap<i32, LabId> =
                routes.iter().map(|(number, lab)| (*number, *lab)).collect();
            for planned in plan_derivatives(&parents, &destinations, now)? {
                changes.add_sample(planned);
            }
        }

        for test in tests_for_samples(tests, &samples) {
            let next_lab = master_tests
                .get(&test.master_test_id)
                .and_then(|master| master.lab_meta(test.processing_lab_id))
                .map(|meta| meta.lab_id);
            match next_lab {
                Some(lab_id) => {
                    changes.update_test(TestDetailUpdate::new(&test.oms_test_id).processing_lab(lab_id));
                }
                None => warn!(
                    oms_test_id = %test.oms_test_id,
                    lab_id = %test.processing_lab_id,
                    "No lab metadata for transferred test"
                ),
            }
        }

        changes.update_samples(samples);
        Ok(())
    }

    fn spawn_lab_eta_update(
        &self,
        oms_order_id: &str,
        inhouse_test_ids: Vec<String>,
        lis_sync_at: DateTime<Utc>,
        lab_id: LabId,
    ) -> JoinHandle<()> {
        let ctx = self.ctx.clone();
        let oms_order_id = oms_order_id.to_string();
        tokio::spawn(async move {
            if !inhouse_test_ids.is_empty() {
                if let Err(e) =
                    update_lab_eta(&ctx, &oms_order_id, &inhouse_test_ids, lis_sync_at, lab_id).await
                {
                    error!(order_id = %oms_order_id, error = %e, "Failed to update lab ETA");
                    return;
                }
            }
            let event = SampleLifecycleEvent::LabEtaUpdate {
                oms_order_id: oms_order_id.clone(),
                lab_id,
            };
            if let Err(e) = ctx.events.publish(event).await {
                error!(order_id = %oms_order_id, error = %e, "Failed to publish lab ETA update");
            }
        })
    }

    /// Mark a sample, and its parent if it has one, as never arrived.
    ///
    /// Every test on the sample number moves to `sample_not_received` in the same commit.
    #[instrument(skip(self, request), fields(sample_id = %request.sample_id))]
    pub async fn mark_as_not_received(&self, request: MarkNotReceivedRequest) -> Result<()> {
        request.validate()?;
        let reason = request.reason.trim().to_string();
        let now = Utc::now();
        let event = SampleEvent::MarkNotReceived {
            reason: reason.clone(),
        };

        let mut record = self.ctx.store.get_sample(request.sample_id).await?;
        self.ctx
            .state_machine
            .transition(&mut record, &event, request.user_id, now)?;
        let oms_order_id = record.sample.oms_order_id.clone();

        let mut changes = ChangeSet::for_order(&oms_order_id);
        if let Some(parent_id) = record.sample.parent_sample_id {
            let mut parent = self.ctx.store.get_sample(parent_id).await?;
            self.ctx
                .state_machine
                .transition(&mut parent, &event, request.user_id, now)?;
            changes.update_sample(parent);
        }

        let tests = self
            .ctx
            .tests
            .get_tests_by_sample_numbers(&oms_order_id, &[record.sample.sample_number])
            .await?;
        let test_ids: Vec<String> = tests.tests.iter().map(|t| t.oms_test_id.clone()).collect();
        for test_id in &test_ids {
            changes.update_test(
                TestDetailUpdate::new(test_id).status(TestStatus::SampleNotReceived),
            );
        }
        changes.update_sample(record);
        self.ctx.store.apply(changes).await?;
        info!(order_id = %oms_order_id, tests = test_ids.len(), "Sample marked not received");

        if request.send_events && !test_ids.is_empty() {
            dispatch_all_in_background(
                self.ctx.events.clone(),
                vec![
                    SampleLifecycleEvent::ResetTats {
                        oms_order_id: oms_order_id.clone(),
                        oms_test_ids: test_ids.clone(),
                    },
                    SampleLifecycleEvent::UpdateTestStatus {
                        oms_order_id,
                        oms_test_ids: test_ids,
                        status: TestStatus::SampleNotReceived,
                        check_order_completion: true,
                    },
                ],
            );
        }
        Ok(())
    }
}

/// Set `lab_tat` and `lab_eta` on in-house tests whose master test has data for `lab_id`
async fn update_lab_eta(
    ctx: &LifecycleContext,
    oms_order_id: &str,
    oms_test_ids: &[String],
    lis_sync_at: DateTime<Utc>,
    lab_id: LabId,
) -> Result<()> {
    let tests = ctx.tests.get_tests_by_oms_test_ids(oms_test_ids).await?;
    let master_ids: BTreeSet<MasterTestId> = tests.iter().map(|t| t.master_test_id).collect();
    let master_tests = ctx
        .master_data
        .get_master_tests_by_ids(&master_ids.into_iter().collect::<Vec<_>>())
        .await?;

    let updates: Vec<TestDetailUpdate> = tests
        .iter()
        .filter(|t| t.oms_order_id == oms_order_id)
        .filter_map(|test| {
            let meta = master_tests.get(&test.master_test_id)?.lab_meta(lab_id)?;
            Some(
                TestDetailUpdate::new(&test.oms_test_id)
                    .lab_eta(lab_eta(lis_sync_at, meta.lab_tat), meta.lab_tat),
            )
        })
        .collect();
    if updates.is_empty() {
        return Ok(());
    }
    debug!(order_id = %oms_order_id, tests = updates.len(), "Updating lab ETA");
    ctx.tests.update_test_details(oms_order_id, updates).await
}

/// `lis_sync_at` plus a turnaround given in (possibly fractional) hours
pub(crate) fn lab_eta(lis_sync_at: DateTime<Utc>, lab_tat_hours: f64) -> DateTime<Utc> {
    let millis = (lab_tat_hours * 3_600_000.0).round() as i64;
    lis_sync_at + Duration::milliseconds(millis)
}

fn sample_numbers(samples: &[SampleRecord]) -> Vec<i32> {
    samples
        .iter()
        .map(|r| r.sample.sample_number)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
