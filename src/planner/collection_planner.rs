//! # Collection Planner
//!
//! Persists the draws computed by [`plan_collections`] for an order and keeps them in
//! step with later test changes.
//!
//! ## Re-planning
//!
//! When tests are added or move to another processing lab after samples exist, the plan
//! is recomputed for every test of the order and diffed against the live root samples,
//! keyed by `(collection sequence, vial, processing lab)`. A planned draw whose key
//! matches an existing sample reuses it; otherwise a new sample is allocated. Mappings
//! are then moved so every test points exactly at its planned samples. Existing samples
//! left without mappings are cleaned up by [`CollectionPlanner::remove_orphan_samples`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::plan::{ordered_master_test_ids, plan_collections, PlannedCollection};
use crate::clients::CollectionSequenceRequest;
use crate::concurrency::JoinErrors;
use crate::constants::{messages, SYSTEM_USER_ID};
use crate::context::LifecycleContext;
use crate::error::{Result, SampleError};
use crate::models::{
    LabId, MappingSelector, NewSample, NewTestSampleMapping, OrderDetails, SampleMetadata,
    SampleRecord, SampleSlot, TestDetail, TestSampleMapping, VialTypeId,
};
use crate::state_machine::{SampleEvent, SampleStatus};
use crate::store::{ChangeSet, PlannedSample};

/// Identity of a draw across re-plans
type DrawKey = (i32, VialTypeId, LabId);

/// What one planning call wrote
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanningOutcome {
    pub created_samples: Vec<SampleRecord>,
    pub mappings_added: usize,
    pub mappings_removed: usize,
    pub samples_deleted: usize,
}

impl PlanningOutcome {
    pub fn is_noop(&self) -> bool {
        self.created_samples.is_empty()
            && self.mappings_added == 0
            && self.mappings_removed == 0
            && self.samples_deleted == 0
    }
}

/// Status and collection time new samples of an order start with
#[derive(Debug, Clone, Copy, PartialEq)]
struct InitialState {
    status: SampleStatus,
    collected_at: Option<DateTime<Utc>>,
}

impl InitialState {
    const PENDING: Self = Self {
        status: SampleStatus::Default,
        collected_at: None,
    };

    /// TRF and bulk orders arrive with the draw already done
    fn for_order(order: &OrderDetails, now: DateTime<Utc>) -> Self {
        if order.is_trf_order() {
            Self {
                status: SampleStatus::CollectionDone,
                collected_at: Some(now),
            }
        } else if order.is_bulk_order() {
            Self {
                status: SampleStatus::CollectionDone,
                collected_at: Some(order.collected_on.unwrap_or(now)),
            }
        } else {
            Self::PENDING
        }
    }
}

#[derive(Clone)]
pub struct CollectionPlanner {
    ctx: Arc<LifecycleContext>,
}

impl CollectionPlanner {
    pub fn new(ctx: Arc<LifecycleContext>) -> Self {
        Self { ctx }
    }

    /// Plan draws for `tests` from the collection sequence and master data.
    ///
    /// Either lookup failing aborts the call.
    pub async fn compute_plan(
        &self,
        order: &OrderDetails,
        tests: &[TestDetail],
    ) -> Result<Vec<PlannedCollection>> {
        if tests.is_empty() {
            return Ok(Vec::new());
        }
        let master_test_ids = ordered_master_test_ids(tests);
        let request = CollectionSequenceRequest {
            city_code: order.city_code.clone(),
            oms_order_id: order.oms_order_id.clone(),
            master_test_ids: master_test_ids.clone(),
        };

        let (sequences, master_tests) = tokio::join!(
            self.ctx.collection_sequence.get_collection_sequence(request),
            self.ctx.master_data.get_master_tests_by_ids(&master_test_ids),
        );
        let mut errors = JoinErrors::new();
        let sequences = errors.record("collection_sequence", sequences);
        let master_tests = errors.record("master_tests", master_tests);
        errors.into_result()?;
        let (Some(sequences), Some(master_tests)) = (sequences, master_tests) else {
            return Err(SampleError::internal("planning lookup returned no value"));
        };

        let plan = plan_collections(tests, &sequences, &master_tests);
        debug!(
            order_id = %order.oms_order_id,
            sequences = sequences.len(),
            draws = plan.len(),
            "Collection plan computed"
        );
        Ok(plan)
    }

    /// Create samples for every test of the order that has no mapping yet
    #[instrument(skip(self), fields(order_id = %oms_order_id))]
    pub async fn create_samples_for_order(
        &self,
        oms_order_id: &str,
        task_sequence: Option<i64>,
    ) -> Result<PlanningOutcome> {
        let order = self.load_order(oms_order_id).await?;
        let (tests, mappings) = tokio::join!(
            self.ctx.tests.get_tests_by_order(&order.oms_order_id),
            self.ctx.store.get_mappings_by_order(&order.oms_order_id),
        );
        let mapped: HashSet<String> = mappings?.into_iter().map(|m| m.oms_test_id).collect();
        let unplanned: Vec<TestDetail> = tests?
            .into_iter()
            .filter(|t| !mapped.contains(&t.oms_test_id))
            .collect();
        if unplanned.is_empty() {
            debug!("Every test already has a sample");
            return Ok(PlanningOutcome::default());
        }

        let plan = self.compute_plan(&order, &unplanned).await?;
        let initial = InitialState::for_order(&order, Utc::now());
        let mut changes = ChangeSet::for_order(&order.oms_order_id);
        let mappings_added = add_planned_samples(
            &mut changes,
            &order,
            &plan,
            task_sequence,
            initial,
            false,
        );
        let applied = self.ctx.store.apply(changes).await?;

        info!(
            samples = applied.created_samples.len(),
            mappings = mappings_added,
            status = %initial.status,
            "Samples created for order"
        );
        Ok(PlanningOutcome {
            created_samples: applied.created_samples,
            mappings_added,
            ..PlanningOutcome::default()
        })
    }

    /// Plan fresh draws for tests that must be collected again
    #[instrument(skip(self, oms_test_ids), fields(order_id = %oms_order_id, tests = oms_test_ids.len()))]
    pub async fn create_samples_for_recollection(
        &self,
        oms_order_id: &str,
        oms_test_ids: &[String],
        task_sequence: Option<i64>,
    ) -> Result<PlanningOutcome> {
        if oms_test_ids.is_empty() {
            return Err(SampleError::validation(messages::TEST_ID_REQUIRED));
        }
        let order = self.load_order(oms_order_id).await?;
        let tests: Vec<TestDetail> = self
            .ctx
            .tests
            .get_tests_by_oms_test_ids(oms_test_ids)
            .await?
            .into_iter()
            .filter(|t| t.oms_order_id == order.oms_order_id)
            .collect();
        if tests.is_empty() {
            return Err(SampleError::not_found(format!(
                "tests {} not found on order {}",
                oms_test_ids.join(","),
                order.oms_order_id
            )));
        }

        let plan = self.compute_plan(&order, &tests).await?;
        let mut changes = ChangeSet::for_order(&order.oms_order_id);
        let mappings_added = add_planned_samples(
            &mut changes,
            &order,
            &plan,
            task_sequence,
            InitialState::PENDING,
            true,
        );
        let applied = self.ctx.store.apply(changes).await?;

        info!(
            samples = applied.created_samples.len(),
            "Recollection samples created"
        );
        Ok(PlanningOutcome {
            created_samples: applied.created_samples,
            mappings_added,
            ..PlanningOutcome::default()
        })
    }

    /// Bring samples and mappings in line with tests that were added or moved lab
    #[instrument(
        skip(self, created, lab_changed),
        fields(order_id = %oms_order_id, created = created.len(), lab_changed = lab_changed.len())
    )]
    pub async fn replan_for_updated_tests(
        &self,
        oms_order_id: &str,
        created: &[String],
        lab_changed: &[String],
    ) -> Result<PlanningOutcome> {
        let order = self.load_order(oms_order_id).await?;
        let roots: Vec<SampleRecord> = self
            .ctx
            .store
            .get_samples_by_order(&order.oms_order_id)
            .await?
            .into_iter()
            .filter(|r| r.sample.is_root())
            .collect();
        if roots.is_empty() {
            debug!("No samples yet, planning from scratch");
            return self.create_samples_for_order(&order.oms_order_id, None).await;
        }

        let (tests, mappings) = tokio::join!(
            self.ctx.tests.get_tests_by_order(&order.oms_order_id),
            self.ctx.store.get_mappings_by_order(&order.oms_order_id),
        );
        let (tests, mappings) = (tests?, mappings?);

        // Tests sitting on a rejected or lost sample stay where they are
        let frozen: HashSet<i32> = roots
            .iter()
            .filter(|r| !r.sample.status.accepts_new_tests())
            .map(|r| r.sample.sample_number)
            .collect();
        let settled: HashSet<&str> = mappings
            .iter()
            .filter(|m| frozen.contains(&m.sample_number))
            .map(|m| m.oms_test_id.as_str())
            .collect();
        let open_tests: Vec<TestDetail> = tests
            .iter()
            .filter(|t| !settled.contains(t.oms_test_id.as_str()))
            .cloned()
            .collect();
        let open_mappings: Vec<TestSampleMapping> = mappings
            .iter()
            .filter(|m| !settled.contains(m.oms_test_id.as_str()))
            .cloned()
            .collect();
        if !frozen.is_empty() {
            debug!(samples = frozen.len(), tests = settled.len(), "Skipping closed samples");
        }

        let plan = self.compute_plan(&order, &open_tests).await?;

        let lab_changed: HashSet<&str> = lab_changed.iter().map(String::as_str).collect();
        let task_sequence = roots.iter().find_map(|r| r.metadata.task_sequence);
        let mut changes = ChangeSet::for_order(&order.oms_order_id);
        let mut reusable = existing_draws(&roots, &open_tests, &open_mappings, &lab_changed);

        // Every (test, slot) pair the new plan wants
        let mut wanted: Vec<(String, VialTypeId, SampleSlot)> = Vec::new();
        for collection in &plan {
            let key = (
                collection.sequence,
                collection.vial_type_id,
                collection.processing_lab_id,
            );
            let slot = match reusable.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(existing) => existing,
                None => changes.add_sample(planned_sample(
                    &order,
                    collection,
                    task_sequence,
                    InitialState::PENDING,
                )),
            };
            for oms_test_id in &collection.oms_test_ids {
                wanted.push((oms_test_id.clone(), collection.vial_type_id, slot));
            }
        }

        let current: HashSet<(&str, i32)> = open_mappings
            .iter()
            .map(|m| (m.oms_test_id.as_str(), m.sample_number))
            .collect();
        let wanted_existing: HashSet<(&str, i32)> = wanted
            .iter()
            .filter_map(|(test, _, slot)| match slot {
                SampleSlot::Existing { sample_number, .. } => Some((test.as_str(), *sample_number)),
                SampleSlot::Planned(_) => None,
            })
            .collect();

        let mut leaving: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        for (oms_test_id, sample_number) in current.difference(&wanted_existing) {
            changes.delete_mappings(MappingSelector::ByTestAndSampleNumber {
                oms_order_id: order.oms_order_id.clone(),
                oms_test_id: oms_test_id.to_string(),
                sample_number: *sample_number,
            });
            leaving.entry(*sample_number).or_default().push(*oms_test_id);
        }
        let mappings_removed: usize = leaving.values().map(Vec::len).sum();

        let mut arriving: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        let mut mappings_added = 0;
        for (oms_test_id, vial_type_id, slot) in &wanted {
            if let SampleSlot::Existing { sample_number, .. } = slot {
                if current.contains(&(oms_test_id.as_str(), *sample_number)) {
                    continue;
                }
                arriving
                    .entry(*sample_number)
                    .or_default()
                    .push(oms_test_id.as_str());
            }
            changes.add_mapping(NewTestSampleMapping {
                oms_order_id: order.oms_order_id.clone(),
                city_code: order.city_code.clone(),
                oms_test_id: oms_test_id.clone(),
                vial_type_id: *vial_type_id,
                slot: *slot,
                recollection_pending: false,
            });
            mappings_added += 1;
        }

        if changes.is_empty() {
            debug!("Plan unchanged");
            return Ok(PlanningOutcome::default());
        }

        let reset = self
            .reconcile_lis_visits(&roots, &tests, &leaving, &arriving, &lab_changed)
            .await?;
        let samples_reset = reset.len();
        changes.update_samples(reset);

        let applied = self.ctx.store.apply(changes).await?;
        info!(
            created_tests = created.len(),
            samples = applied.created_samples.len(),
            added = mappings_added,
            removed = mappings_removed,
            reset = samples_reset,
            "Samples re-planned"
        );
        Ok(PlanningOutcome {
            created_samples: applied.created_samples,
            mappings_added,
            mappings_removed,
            samples_deleted: 0,
        })
    }

    /// Mirror re-planned mappings onto the LIS visits of already synced samples.
    ///
    /// Tests leaving a sample are cancelled on its visit and tests arriving are added to
    /// it. A synced sample that loses a test to another lab goes back to the receiving
    /// desk; the returned records carry that transition and still need persisting. Any LIS
    /// failure aborts before the caller writes.
    async fn reconcile_lis_visits(
        &self,
        roots: &[SampleRecord],
        tests: &[TestDetail],
        leaving: &BTreeMap<i32, Vec<&str>>,
        arriving: &BTreeMap<i32, Vec<&str>>,
        lab_changed: &HashSet<&str>,
    ) -> Result<Vec<SampleRecord>> {
        let by_number: HashMap<i32, &SampleRecord> = roots
            .iter()
            .map(|r| (r.sample.sample_number, r))
            .collect();
        let details = |ids: &[&str]| -> Vec<TestDetail> {
            tests
                .iter()
                .filter(|t| ids.contains(&t.oms_test_id.as_str()))
                .cloned()
                .collect()
        };
        let on_visit = |number: &i32| {
            let record = *by_number.get(number)?;
            let visit_id = record.sample.visit_id()?;
            record
                .sample
                .status
                .tracks_lis_visit()
                .then(|| (record, visit_id.to_string()))
        };

        let now = Utc::now();
        let mut reset = Vec::new();
        let mut cleared: HashSet<i32> = HashSet::new();
        for (number, ids) in leaving {
            let Some((record, visit_id)) = on_visit(number) else {
                continue;
            };
            self.ctx
                .lis
                .cancel_lis_sync_data(&details(ids), &visit_id, record)
                .await?;
            debug!(sample_number = number, visit_id = %visit_id, tests = ids.len(), "Cancelled moved tests in LIS");

            let moved_lab = ids.iter().any(|id| lab_changed.contains(id));
            if moved_lab && record.sample.status == SampleStatus::Synced {
                let mut record = record.clone();
                self.ctx.state_machine.transition(
                    &mut record,
                    &SampleEvent::ResetLisSync,
                    SYSTEM_USER_ID,
                    now,
                )?;
                info!(sample_id = %record.id(), visit_id = %visit_id, "Sample returned to receiving after lab change");
                cleared.insert(*number);
                reset.push(record);
            }
        }

        for (number, ids) in arriving {
            if cleared.contains(number) {
                continue;
            }
            let Some((record, visit_id)) = on_visit(number) else {
                continue;
            };
            self.ctx
                .lis
                .modify_lis_sync_data(&details(ids), &visit_id, record)
                .await?;
            debug!(sample_number = number, visit_id = %visit_id, tests = ids.len(), "Added re-planned tests to LIS visit");
        }
        Ok(reset)
    }

    /// Drop the mappings of removed tests, deleting samples nothing else is mapped to.
    ///
    /// Visits already registered in the LIS are cancelled for the removed test first; a
    /// cancellation failure aborts before anything is written.
    #[instrument(skip(self, removed), fields(order_id = %oms_order_id, removed = removed.len()))]
    pub async fn delete_samples_for_removed_tests(
        &self,
        oms_order_id: &str,
        removed: &[String],
    ) -> Result<PlanningOutcome> {
        if oms_order_id.trim().is_empty() {
            return Err(SampleError::validation(messages::ORDER_ID_REQUIRED));
        }
        if removed.is_empty() {
            return Ok(PlanningOutcome::default());
        }
        let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();

        let mappings = self.ctx.store.get_mappings_by_order(oms_order_id).await?;
        let (doomed, surviving): (Vec<&TestSampleMapping>, Vec<&TestSampleMapping>) = mappings
            .iter()
            .partition(|m| removed_set.contains(m.oms_test_id.as_str()));
        if doomed.is_empty() {
            debug!("Removed tests had no samples");
            return Ok(PlanningOutcome::default());
        }

        let numbers: Vec<i32> = doomed
            .iter()
            .map(|m| m.sample_number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let (samples, tests) = tokio::join!(
            self.ctx
                .store
                .get_samples_by_sample_numbers(oms_order_id, &numbers),
            self.ctx.tests.get_tests_by_oms_test_ids(removed),
        );
        let samples = samples?;
        let tests: HashMap<String, TestDetail> = tests?
            .into_iter()
            .filter(|t| t.oms_order_id == oms_order_id)
            .map(|t| (t.oms_test_id.clone(), t))
            .collect();

        for mapping in &doomed {
            let Some(test) = tests.get(&mapping.oms_test_id) else {
                continue;
            };
            let synced = samples.iter().find_map(|r| {
                (r.sample.sample_number == mapping.sample_number && r.sample.is_root())
                    .then_some(r)
                    .and_then(|r| r.sample.visit_id().map(|visit| (r, visit)))
            });
            if let Some((record, visit_id)) = synced {
                self.ctx
                    .lis
                    .cancel_lis_sync_data(std::slice::from_ref(test), visit_id, record)
                    .await?;
                debug!(test_id = %test.oms_test_id, visit_id = %visit_id, "Cancelled removed test in LIS");
            }
        }

        let still_mapped: HashSet<i32> = surviving.iter().map(|m| m.sample_number).collect();
        let now = Utc::now();
        let mut changes = ChangeSet::for_order(oms_order_id);
        let mut samples_deleted = 0;
        for mut record in samples {
            if still_mapped.contains(&record.sample.sample_number) {
                continue;
            }
            self.ctx
                .state_machine
                .transition(&mut record, &SampleEvent::Delete, SYSTEM_USER_ID, now)?;
            changes.update_sample(record);
            samples_deleted += 1;
        }
        for mapping in &doomed {
            changes.delete_mappings(MappingSelector::ByTestAndSampleNumber {
                oms_order_id: oms_order_id.to_string(),
                oms_test_id: mapping.oms_test_id.clone(),
                sample_number: mapping.sample_number,
            });
        }
        self.ctx.store.apply(changes).await?;

        info!(
            mappings = doomed.len(),
            samples = samples_deleted,
            "Removed tests unmapped"
        );
        Ok(PlanningOutcome {
            mappings_removed: doomed.len(),
            samples_deleted,
            ..PlanningOutcome::default()
        })
    }

    /// Soft-delete root samples of an order with no surviving mapping
    #[instrument(skip(self), fields(order_id = %oms_order_id))]
    pub async fn remove_orphan_samples(&self, oms_order_id: &str) -> Result<usize> {
        if oms_order_id.trim().is_empty() {
            return Err(SampleError::validation(messages::ORDER_ID_REQUIRED));
        }
        let (samples, mappings) = tokio::join!(
            self.ctx.store.get_samples_by_order(oms_order_id),
            self.ctx.store.get_mappings_by_order(oms_order_id),
        );
        let mapped: HashSet<i32> = mappings?.iter().map(|m| m.sample_number).collect();

        let now = Utc::now();
        let mut orphans = Vec::new();
        for mut record in samples?
            .into_iter()
            .filter(|r| r.sample.is_root() && !mapped.contains(&r.sample.sample_number))
        {
            self.ctx
                .state_machine
                .transition(&mut record, &SampleEvent::Delete, SYSTEM_USER_ID, now)?;
            orphans.push(record);
        }
        if orphans.is_empty() {
            return Ok(0);
        }

        let count = orphans.len();
        let mut changes = ChangeSet::for_order(oms_order_id);
        changes.update_samples(orphans);
        self.ctx.store.apply(changes).await?;
        info!(samples = count, "Orphan samples deleted");
        Ok(count)
    }

    async fn load_order(&self, oms_order_id: &str) -> Result<OrderDetails> {
        let oms_order_id = oms_order_id.trim();
        if oms_order_id.is_empty() {
            return Err(SampleError::validation(messages::ORDER_ID_REQUIRED));
        }
        self.ctx
            .orders
            .get_order_by_oms_order_id(oms_order_id)
            .await?
            .ok_or_else(|| SampleError::not_found(messages::ORDER_NOT_FOUND))
    }
}

fn planned_sample(
    order: &OrderDetails,
    collection: &PlannedCollection,
    task_sequence: Option<i64>,
    initial: InitialState,
) -> PlannedSample {
    let sample = NewSample {
        oms_order_id: order.oms_order_id.clone(),
        oms_request_id: order.oms_request_id.clone(),
        city_code: order.city_code.clone(),
        vial_type_id: collection.vial_type_id,
        parent_sample_id: None,
        lab_id: None,
        destination_lab_id: order.servicing_lab_id,
        status: initial.status,
        barcode: None,
        visit_id: None,
        created_by: SYSTEM_USER_ID,
    };
    let mut metadata =
        SampleMetadata::for_order(&order.oms_order_id, &order.city_code, collection.sequence);
    metadata.task_sequence = task_sequence;
    metadata.collected_at = initial.collected_at;
    metadata.updated_by = SYSTEM_USER_ID;
    PlannedSample::allocated(sample, metadata)
}

/// Queue one sample per planned draw and map its tests to it; returns the mapping count
fn add_planned_samples(
    changes: &mut ChangeSet,
    order: &OrderDetails,
    plan: &[PlannedCollection],
    task_sequence: Option<i64>,
    initial: InitialState,
    recollection_pending: bool,
) -> usize {
    let mut added = 0;
    for collection in plan {
        let slot = changes.add_sample(planned_sample(order, collection, task_sequence, initial));
        for oms_test_id in &collection.oms_test_ids {
            changes.add_mapping(NewTestSampleMapping {
                oms_order_id: order.oms_order_id.clone(),
                city_code: order.city_code.clone(),
                oms_test_id: oms_test_id.clone(),
                vial_type_id: collection.vial_type_id,
                slot,
                recollection_pending,
            });
            added += 1;
        }
    }
    added
}

/// Root samples still open to new tests, grouped by draw key in sample-number order.
///
/// A sample's lab is the processing lab of the first test mapped to it, preferring tests
/// that did not just move lab.
fn existing_draws(
    roots: &[SampleRecord],
    tests: &[TestDetail],
    mappings: &[TestSampleMapping],
    lab_changed: &HashSet<&str>,
) -> HashMap<DrawKey, VecDeque<SampleSlot>> {
    let labs: HashMap<&str, LabId> = tests
        .iter()
        .map(|t| (t.oms_test_id.as_str(), t.processing_lab_id))
        .collect();

    let mut sorted: Vec<&SampleRecord> = roots
        .iter()
        .filter(|r| r.sample.status.accepts_new_tests())
        .collect();
    sorted.sort_by_key(|r| r.sample.sample_number);

    let mut draws: HashMap<DrawKey, VecDeque<SampleSlot>> = HashMap::new();
    for record in sorted {
        let number = record.sample.sample_number;
        let on_number: Vec<&TestSampleMapping> = mappings
            .iter()
            .filter(|m| m.sample_number == number)
            .collect();
        let lab = on_number
            .iter()
            .find(|m| !lab_changed.contains(m.oms_test_id.as_str()))
            .or_else(|| on_number.first())
            .and_then(|m| labs.get(m.oms_test_id.as_str()).copied());
        let Some(lab) = lab else {
            warn!(sample_id = %record.id(), sample_number = number, "Sample has no mapped test, not reusable");
            continue;
        };
        let key = (
            record.metadata.collection_sequence_number,
            record.sample.vial_type_id,
            lab,
        );
        draws.entry(key).or_default().push_back(SampleSlot::Existing {
            sample_id: record.id(),
            sample_number: number,
        });
    }
    draws
}
