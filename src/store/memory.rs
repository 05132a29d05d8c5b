//! # In-Memory Store
//!
//! A [`SampleStore`] and lookup backend held entirely in process memory. Used by the test
//! suite and by single-node deployments that do not need durability.
//!
//! `apply` clones the state, applies the change set to the clone and swaps it in only on
//! success, so a failing change set leaves nothing behind. The uniqueness rules enforced by
//! the Postgres partial indexes are checked on the clone before the swap.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use super::changes::{allocate_sample_numbers, AppliedChanges, ChangeSet, TaskRef};
use super::SampleStore;
use crate::constants::messages;
use crate::error::{Result, SampleError};
use crate::lookups::{OrderLookup, PatientLookup, TaskService, TestLookup, TestsWithMappings};
use crate::models::{
    LabId, OrderDetails, PatientDetails, SampleId, SampleRecord, SampleSlot, Task, TaskId,
    TaskMetadata, TestDetail, TestDetailUpdate, TestSampleMapping,
};
use crate::state_machine::SampleStatus;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Every sample ever inserted, deleted ones included
    samples: BTreeMap<SampleId, SampleRecord>,
    mappings: Vec<TestSampleMapping>,
    orders: Vec<OrderDetails>,
    patients: HashMap<i64, PatientDetails>,
    tests: Vec<TestDetail>,
    tasks: Vec<Task>,
    task_metadata: Vec<TaskMetadata>,
    next_sample_id: i64,
    next_mapping_id: i64,
    next_task_id: i64,
    next_test_id: i64,
}

impl MemoryState {
    fn live_samples(&self) -> impl Iterator<Item = &SampleRecord> {
        self.samples.values().filter(|r| !r.sample.is_deleted())
    }

    fn max_sample_number(&self, oms_order_id: &str) -> i32 {
        self.samples
            .values()
            .filter(|r| r.sample.oms_order_id == oms_order_id)
            .map(|r| r.sample.sample_number)
            .max()
            .unwrap_or(0)
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<AppliedChanges> {
        let now = Utc::now();
        let mut applied = AppliedChanges::default();

        for record in &changes.sample_updates {
            let existing = self.samples.get_mut(&record.id()).ok_or_else(|| {
                SampleError::not_found(format!("sample {} not found", record.id()))
            })?;
            let mut updated = record.clone();
            updated.metadata.sample_id = record.id();
            *existing = updated;
        }

        let numbers = allocate_sample_numbers(
            &changes.new_samples,
            self.max_sample_number(&changes.oms_order_id),
        );
        for (planned, sample_number) in changes.new_samples.iter().zip(numbers) {
            self.next_sample_id += 1;
            let id = SampleId(self.next_sample_id);
            let sample = planned.sample.clone().into_sample(id, sample_number, now);
            let mut metadata = planned.metadata.clone();
            metadata.sample_id = id;
            metadata.updated_by = sample.updated_by;
            let record = SampleRecord::new(sample, metadata);
            self.samples.insert(id, record.clone());
            applied.created_samples.push(record);
        }

        for selector in &changes.mapping_deletions {
            for mapping in self.mappings.iter_mut().filter(|m| selector.matches(m)) {
                mapping.deleted_at = Some(now);
            }
        }

        for rejection in &changes.mapping_rejections {
            for mapping in self
                .mappings
                .iter_mut()
                .filter(|m| rejection.selector.matches(m))
            {
                mapping.is_rejected = true;
                mapping.rejection_reason = rejection.reason.clone();
            }
        }

        for new_mapping in &changes.new_mappings {
            let (sample_id, sample_number) = match new_mapping.slot {
                SampleSlot::Existing {
                    sample_id,
                    sample_number,
                } => (sample_id, sample_number),
                slot @ SampleSlot::Planned(_) => {
                    let index = changes.planned_index(slot).ok_or_else(|| {
                        SampleError::internal(format!("mapping refers to unknown slot {slot:?}"))
                    })?;
                    let created = &applied.created_samples[index];
                    (created.id(), created.sample.sample_number)
                }
            };
            self.next_mapping_id += 1;
            self.mappings.push(TestSampleMapping {
                id: self.next_mapping_id,
                oms_order_id: new_mapping.oms_order_id.clone(),
                city_code: new_mapping.city_code.clone(),
                oms_test_id: new_mapping.oms_test_id.clone(),
                vial_type_id: new_mapping.vial_type_id,
                sample_id,
                sample_number,
                recollection_pending: new_mapping.recollection_pending,
                is_rejected: false,
                rejection_reason: None,
                deleted_at: None,
            });
        }

        let task_id = match changes.task_assignment.as_ref().map(|a| &a.task) {
            Some(TaskRef::Existing(id)) => Some(*id),
            Some(TaskRef::New(new_task)) => {
                self.next_task_id += 1;
                let id = TaskId(self.next_task_id);
                self.tasks.push(new_task.clone().into_task(id, now));
                self.task_metadata.push(TaskMetadata {
                    task_id: id,
                    ..TaskMetadata::default()
                });
                Some(id)
            }
            None => None,
        };

        self.update_tests(&changes.oms_order_id, &changes.test_updates);

        if let (Some(task_id), Some(assignment)) = (task_id, changes.task_assignment.as_ref()) {
            for test in self.tests.iter_mut().filter(|t| {
                t.oms_order_id == changes.oms_order_id
                    && assignment.oms_test_ids.contains(&t.oms_test_id)
            }) {
                test.task_id = Some(task_id);
            }
        }
        applied.task_id = task_id;

        self.check_uniqueness()?;
        Ok(applied)
    }

    fn update_tests(&mut self, oms_order_id: &str, updates: &[TestDetailUpdate]) {
        for update in updates {
            for test in self
                .tests
                .iter_mut()
                .filter(|t| t.oms_order_id == oms_order_id && t.oms_test_id == update.oms_test_id)
            {
                update.apply_to(test);
            }
        }
    }

    /// Root samples only: derivatives share their parent's barcode and number
    fn check_uniqueness(&self) -> Result<()> {
        let mut numbers = HashSet::new();
        let mut barcodes = HashSet::new();
        for record in self.live_samples().filter(|r| r.sample.is_root()) {
            let sample = &record.sample;
            if !numbers.insert((sample.oms_order_id.as_str(), sample.sample_number)) {
                return Err(SampleError::conflict(format!(
                    "sample number {} already exists for order {}",
                    sample.sample_number, sample.oms_order_id
                )));
            }
            if let Some(barcode) = sample.barcode() {
                if !barcodes.insert(barcode) {
                    return Err(SampleError::conflict(messages::DUPLICATE_BARCODE));
                }
            }
        }
        Ok(())
    }
}

/// Process-local store that also serves the order, patient, test and task lookups
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: OrderDetails) {
        self.state.write().orders.push(order);
    }

    pub fn insert_patient(&self, patient: PatientDetails) {
        self.state.write().patients.insert(patient.id, patient);
    }

    /// Insert a test row; a zero id is replaced with the next free one
    pub fn insert_test(&self, mut test: TestDetail) -> TestDetail {
        let mut state = self.state.write();
        if test.id == 0 {
            state.next_test_id += 1;
            test.id = state.next_test_id;
        }
        state.tests.push(test.clone());
        test
    }

    pub fn insert_task(&self, task: Task) {
        let mut state = self.state.write();
        state.next_task_id = state.next_task_id.max(task.id.get());
        state.tasks.push(task);
    }

    /// Every sample of an order, soft-deleted rows included
    pub fn all_samples_for_order(&self, oms_order_id: &str) -> Vec<SampleRecord> {
        self.state
            .read()
            .samples
            .values()
            .filter(|r| r.sample.oms_order_id == oms_order_id)
            .cloned()
            .collect()
    }

    /// Every mapping of an order, soft-deleted rows included
    pub fn all_mappings_for_order(&self, oms_order_id: &str) -> Vec<TestSampleMapping> {
        self.state
            .read()
            .mappings
            .iter()
            .filter(|m| m.oms_order_id == oms_order_id)
            .cloned()
            .collect()
    }

    pub fn tasks_for_order(&self, oms_order_id: &str) -> Vec<Task> {
        self.state
            .read()
            .tasks
            .iter()
            .filter(|t| t.oms_order_id == oms_order_id)
            .cloned()
            .collect()
    }

    pub fn task_metadata(&self, task_id: TaskId) -> Option<TaskMetadata> {
        self.state
            .read()
            .task_metadata
            .iter()
            .find(|m| m.task_id == task_id)
            .cloned()
    }

    fn select_samples<F>(&self, filter: F) -> Vec<SampleRecord>
    where
        F: Fn(&SampleRecord) -> bool,
    {
        self.state
            .read()
            .live_samples()
            .filter(|r| filter(r))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SampleStore for InMemoryStore {
    async fn get_sample(&self, id: SampleId) -> Result<SampleRecord> {
        self.select_samples(|r| r.id() == id)
            .into_iter()
            .next()
            .ok_or_else(|| SampleError::not_found(format!("sample {id} not found")))
    }

    async fn get_samples_by_ids(&self, ids: &[SampleId]) -> Result<Vec<SampleRecord>> {
        Ok(self.select_samples(|r| ids.contains(&r.id())))
    }

    async fn get_samples_by_order(&self, oms_order_id: &str) -> Result<Vec<SampleRecord>> {
        Ok(self.select_samples(|r| r.sample.oms_order_id == oms_order_id))
    }

    async fn get_samples_by_request(&self, oms_request_id: &str) -> Result<Vec<SampleRecord>> {
        Ok(self.select_samples(|r| r.sample.oms_request_id == oms_request_id))
    }

    async fn get_samples_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<Vec<SampleRecord>> {
        Ok(self.select_samples(|r| {
            r.sample.oms_order_id == oms_order_id && sample_numbers.contains(&r.sample.sample_number)
        }))
    }

    async fn get_samples_by_barcode(
        &self,
        barcode: &str,
        statuses: &[SampleStatus],
    ) -> Result<Vec<SampleRecord>> {
        Ok(self.select_samples(|r| {
            r.sample.barcode() == Some(barcode)
                && (statuses.is_empty() || statuses.contains(&r.sample.status))
        }))
    }

    async fn get_collected_samples(
        &self,
        oms_order_id: &str,
        destination_lab_id: LabId,
        statuses: &[SampleStatus],
    ) -> Result<Vec<SampleRecord>> {
        Ok(self.select_samples(|r| {
            r.sample.oms_order_id == oms_order_id
                && r.sample.destination_lab_id == destination_lab_id
                && statuses.contains(&r.sample.status)
        }))
    }

    async fn find_existing_barcodes(&self, barcodes: &[String]) -> Result<Vec<(String, SampleId)>> {
        Ok(self
            .select_samples(|r| {
                r.sample
                    .barcode()
                    .is_some_and(|b| barcodes.iter().any(|wanted| wanted == b))
            })
            .into_iter()
            .filter_map(|r| r.sample.barcode.clone().map(|b| (b, r.id())))
            .collect())
    }

    async fn get_interlab_samples_by_parent(
        &self,
        parent_id: SampleId,
    ) -> Result<Vec<SampleRecord>> {
        Ok(self.select_samples(|r| r.sample.parent_sample_id == Some(parent_id)))
    }

    async fn get_mappings_by_order(&self, oms_order_id: &str) -> Result<Vec<TestSampleMapping>> {
        Ok(self
            .state
            .read()
            .mappings
            .iter()
            .filter(|m| m.oms_order_id == oms_order_id && m.is_active())
            .cloned()
            .collect())
    }

    async fn get_mappings_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<Vec<TestSampleMapping>> {
        Ok(self
            .state
            .read()
            .mappings
            .iter()
            .filter(|m| {
                m.oms_order_id == oms_order_id
                    && m.is_active()
                    && sample_numbers.contains(&m.sample_number)
            })
            .cloned()
            .collect())
    }

    async fn apply(&self, changes: ChangeSet) -> Result<AppliedChanges> {
        let order_id = changes.oms_order_id.clone();
        let mut state = self.state.write();
        let mut next = state.clone();
        let applied = next.apply(changes)?;
        *state = next;
        debug!(
            order_id = %order_id,
            created = applied.created_samples.len(),
            "Applied change set in memory"
        );
        Ok(applied)
    }
}

#[async_trait]
impl OrderLookup for InMemoryStore {
    async fn get_order_by_oms_order_id(&self, oms_order_id: &str) -> Result<Option<OrderDetails>> {
        Ok(self
            .state
            .read()
            .orders
            .iter()
            .find(|o| o.oms_order_id == oms_order_id)
            .cloned())
    }

    async fn get_order_by_trf_id(&self, trf_id: &str) -> Result<Option<OrderDetails>> {
        Ok(self
            .state
            .read()
            .orders
            .iter()
            .find(|o| o.trf_id.as_deref() == Some(trf_id))
            .cloned())
    }
}

#[async_trait]
impl PatientLookup for InMemoryStore {
    async fn get_patient_details(&self, patient_details_id: i64) -> Result<PatientDetails> {
        self.state
            .read()
            .patients
            .get(&patient_details_id)
            .cloned()
            .ok_or_else(|| {
                SampleError::not_found(format!("patient details {patient_details_id} not found"))
            })
    }
}

#[async_trait]
impl TestLookup for InMemoryStore {
    async fn get_tests_by_order(&self, oms_order_id: &str) -> Result<Vec<TestDetail>> {
        Ok(self
            .state
            .read()
            .tests
            .iter()
            .filter(|t| t.oms_order_id == oms_order_id)
            .cloned()
            .collect())
    }

    async fn get_tests_by_oms_test_ids(&self, oms_test_ids: &[String]) -> Result<Vec<TestDetail>> {
        Ok(self
            .state
            .read()
            .tests
            .iter()
            .filter(|t| oms_test_ids.contains(&t.oms_test_id))
            .cloned()
            .collect())
    }

    async fn get_tests_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<TestsWithMappings> {
        let state = self.state.read();
        let mappings: Vec<TestSampleMapping> = state
            .mappings
            .iter()
            .filter(|m| {
                m.oms_order_id == oms_order_id
                    && m.is_active()
                    && sample_numbers.contains(&m.sample_number)
            })
            .cloned()
            .collect();
        let test_ids: HashSet<&str> = mappings.iter().map(|m| m.oms_test_id.as_str()).collect();
        let tests = state
            .tests
            .iter()
            .filter(|t| t.oms_order_id == oms_order_id && test_ids.contains(t.oms_test_id.as_str()))
            .cloned()
            .collect();
        Ok(TestsWithMappings { tests, mappings })
    }

    async fn update_test_details(
        &self,
        oms_order_id: &str,
        updates: Vec<TestDetailUpdate>,
    ) -> Result<()> {
        self.state.write().update_tests(oms_order_id, &updates);
        Ok(())
    }
}

#[async_trait]
impl TaskService for InMemoryStore {
    async fn get_task_by_oms_order_id(&self, oms_order_id: &str) -> Result<Option<Task>> {
        Ok(self
            .state
            .read()
            .tasks
            .iter()
            .find(|t| t.oms_order_id == oms_order_id && t.is_active)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        MappingSelector, NewSample, NewTask, NewTestSampleMapping, SampleMetadata, UserId,
        VialTypeId,
    };
    use crate::store::PlannedSample;

    fn planned(order: &str, barcode: Option<&str>) -> PlannedSample {
        PlannedSample::allocated(
            NewSample {
                oms_order_id: order.to_string(),
                oms_request_id: "R1".to_string(),
                city_code: "BLR".to_string(),
                vial_type_id: VialTypeId(5),
                parent_sample_id: None,
                lab_id: None,
                destination_lab_id: LabId(10),
                status: SampleStatus::Default,
                barcode: barcode.map(str::to_string),
                visit_id: None,
                created_by: UserId(1),
            },
            SampleMetadata::for_order(order, "BLR", 1),
        )
    }

    fn mapping(order: &str, test: &str, slot: SampleSlot) -> NewTestSampleMapping {
        NewTestSampleMapping {
            oms_order_id: order.to_string(),
            city_code: "BLR".to_string(),
            oms_test_id: test.to_string(),
            vial_type_id: VialTypeId(5),
            slot,
            recollection_pending: false,
        }
    }

    #[tokio::test]
    async fn test_apply_allocates_numbers_and_resolves_slots() {
        let store = InMemoryStore::new();
        let mut changes = ChangeSet::for_order("O1");
        let first = changes.add_sample(planned("O1", None));
        let second = changes.add_sample(planned("O1", None));
        changes.add_mapping(mapping("O1", "T1", first));
        changes.add_mapping(mapping("O1", "T2", second));

        let applied = store.apply(changes).await.unwrap();
        let numbers: Vec<i32> = applied
            .created_samples
            .iter()
            .map(|r| r.sample.sample_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);

        let mappings = store.get_mappings_by_order("O1").await.unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[1].sample_number, 2);
        assert_eq!(mappings[1].sample_id, applied.created_samples[1].id());
        assert_eq!(
            applied.created_samples[0].metadata.sample_id,
            applied.created_samples[0].id()
        );
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_state_untouched() {
        let store = InMemoryStore::new();
        let mut changes = ChangeSet::for_order("O1");
        changes.add_sample(planned("O1", Some("BC1")));
        store.apply(changes).await.unwrap();

        let mut changes = ChangeSet::for_order("O2");
        changes.add_sample(planned("O2", None));
        changes.add_sample(planned("O2", Some("BC1")));
        let err = store.apply(changes).await.unwrap_err();
        assert_eq!(err, SampleError::conflict(messages::DUPLICATE_BARCODE));
        assert!(store.get_samples_by_order("O2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_numbers_are_not_reused() {
        let store = InMemoryStore::new();
        let mut changes = ChangeSet::for_order("O1");
        changes.add_sample(planned("O1", None));
        let applied = store.apply(changes).await.unwrap();

        let mut deleted = applied.created_samples[0].clone();
        deleted.sample.status = SampleStatus::Deleted;
        deleted.sample.deleted_at = Some(Utc::now());
        let mut changes = ChangeSet::for_order("O1");
        changes.update_sample(deleted);
        changes.add_sample(planned("O1", None));
        let applied = store.apply(changes).await.unwrap();

        assert_eq!(applied.created_samples[0].sample.sample_number, 2);
        assert_eq!(store.get_samples_by_order("O1").await.unwrap().len(), 1);
        assert_eq!(store.all_samples_for_order("O1").len(), 2);
    }

    #[tokio::test]
    async fn test_task_creation_and_assignment() {
        let store = InMemoryStore::new();
        store.insert_test(TestDetail {
            id: 0,
            oms_order_id: "O1".to_string(),
            oms_test_id: "T1".to_string(),
            test_name: "CBC".to_string(),
            city_code: "BLR".to_string(),
            task_id: None,
            lab_id: LabId(10),
            processing_lab_id: LabId(10),
            master_test_id: crate::models::MasterTestId(100),
            status: crate::models::TestStatus::Requested,
            lab_eta: None,
            lab_tat: None,
        });

        let mut changes = ChangeSet::for_order("O1");
        changes.assign_task(
            TaskRef::New(NewTask {
                oms_order_id: "O1".to_string(),
                oms_request_id: "R1".to_string(),
                lab_id: LabId(10),
                city_code: "BLR".to_string(),
                order_type: "at_home".to_string(),
                patient_details_id: 1,
            }),
            vec!["T1".to_string()],
        );
        let applied = store.apply(changes).await.unwrap();
        let task_id = applied.task_id.unwrap();

        let task = store.get_task_by_oms_order_id("O1").await.unwrap().unwrap();
        assert_eq!(task.id, task_id);
        assert!(store.task_metadata(task_id).is_some());
        let tests = store.get_tests_by_order("O1").await.unwrap();
        assert_eq!(tests[0].task_id, Some(task_id));
    }

    #[tokio::test]
    async fn test_mapping_rejection_and_deletion() {
        let store = InMemoryStore::new();
        let mut changes = ChangeSet::for_order("O1");
        let slot = changes.add_sample(planned("O1", None));
        changes.add_mapping(mapping("O1", "T1", slot));
        changes.add_mapping(mapping("O1", "T2", slot));
        let applied = store.apply(changes).await.unwrap();
        let sample_id = applied.created_samples[0].id();

        let mut changes = ChangeSet::for_order("O1");
        changes.reject_mappings(
            MappingSelector::ByTestAndSampleNumber {
                oms_order_id: "O1".to_string(),
                oms_test_id: "T1".to_string(),
                sample_number: 1,
            },
            Some("Hemolysed".to_string()),
        );
        changes.delete_mappings(MappingSelector::ByTests {
            oms_order_id: "O1".to_string(),
            oms_test_ids: vec!["T2".to_string()],
        });
        store.apply(changes).await.unwrap();

        let mappings = store.get_mappings_by_order("O1").await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert!(mappings[0].is_rejected);
        assert_eq!(mappings[0].sample_id, sample_id);
        assert_eq!(store.all_mappings_for_order("O1").len(), 2);
    }
}
