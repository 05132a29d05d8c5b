//! Unit-of-work types applied atomically by a [`SampleStore`](super::SampleStore).

use serde::{Deserialize, Serialize};

use crate::models::{
    MappingSelector, NewSample, NewTask, NewTestSampleMapping, SampleMetadata, SampleRecord,
    SampleSlot, TaskId, TestDetailUpdate,
};

/// A sample to insert together with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSample {
    pub sample: NewSample,
    pub metadata: SampleMetadata,
    /// `None` allocates the next number for the order; derivatives reuse their parent's
    pub sample_number: Option<i32>,
}

impl PlannedSample {
    pub fn allocated(sample: NewSample, metadata: SampleMetadata) -> Self {
        Self {
            sample,
            metadata,
            sample_number: None,
        }
    }

    pub fn with_number(sample: NewSample, metadata: SampleMetadata, sample_number: i32) -> Self {
        Self {
            sample,
            metadata,
            sample_number: Some(sample_number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskRef {
    Existing(TaskId),
    /// Created, with its metadata row, inside the same transaction
    New(NewTask),
}

/// Assign a task to tests, creating the task first when needed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task: TaskRef,
    pub oms_test_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRejection {
    pub selector: MappingSelector,
    pub reason: Option<String>,
}

/// Every write one workflow step needs, scoped to a single order.
///
/// Applied in this order: sample updates, sample inserts, mapping deletions, mapping
/// rejections, mapping inserts, task creation, test updates, task assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub oms_order_id: String,
    pub sample_updates: Vec<SampleRecord>,
    pub new_samples: Vec<PlannedSample>,
    pub mapping_deletions: Vec<MappingSelector>,
    pub mapping_rejections: Vec<MappingRejection>,
    pub new_mappings: Vec<NewTestSampleMapping>,
    pub test_updates: Vec<TestDetailUpdate>,
    pub task_assignment: Option<TaskAssignment>,
}

impl ChangeSet {
    pub fn for_order(oms_order_id: impl Into<String>) -> Self {
        Self {
            oms_order_id: oms_order_id.into(),
            ..Self::default()
        }
    }

    pub fn update_sample(&mut self, record: SampleRecord) -> &mut Self {
        self.sample_updates.push(record);
        self
    }

    pub fn update_samples(&mut self, records: impl IntoIterator<Item = SampleRecord>) -> &mut Self {
        self.sample_updates.extend(records);
        self
    }

    /// Queue an insert and return the slot mappings should use to point at it
    pub fn add_sample(&mut self, planned: PlannedSample) -> SampleSlot {
        self.new_samples.push(planned);
        SampleSlot::Planned(self.new_samples.len() as i32)
    }

    pub fn add_mapping(&mut self, mapping: NewTestSampleMapping) -> &mut Self {
        self.new_mappings.push(mapping);
        self
    }

    pub fn delete_mappings(&mut self, selector: MappingSelector) -> &mut Self {
        self.mapping_deletions.push(selector);
        self
    }

    pub fn reject_mappings(&mut self, selector: MappingSelector, reason: Option<String>) -> &mut Self {
        self.mapping_rejections
            .push(MappingRejection { selector, reason });
        self
    }

    pub fn update_test(&mut self, update: TestDetailUpdate) -> &mut Self {
        self.test_updates.push(update);
        self
    }

    pub fn assign_task(&mut self, task: TaskRef, oms_test_ids: Vec<String>) -> &mut Self {
        self.task_assignment = Some(TaskAssignment { task, oms_test_ids });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sample_updates.is_empty()
            && self.new_samples.is_empty()
            && self.mapping_deletions.is_empty()
            && self.mapping_rejections.is_empty()
            && self.new_mappings.is_empty()
            && self.test_updates.is_empty()
            && self.task_assignment.is_none()
    }

    /// 1-based index into `new_samples` for a planned slot
    pub(crate) fn planned_index(&self, slot: SampleSlot) -> Option<usize> {
        match slot {
            SampleSlot::Planned(n) if n >= 1 && (n as usize) <= self.new_samples.len() => {
                Some(n as usize - 1)
            }
            _ => None,
        }
    }
}

/// What the store assigned while applying a [`ChangeSet`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedChanges {
    /// Inserted samples, in `new_samples` order
    pub created_samples: Vec<SampleRecord>,
    pub task_id: Option<TaskId>,
}

/// Sample numbers for the planned inserts: explicit numbers are kept, the rest count up
/// from `current_max`
pub(crate) fn allocate_sample_numbers(planned: &[PlannedSample], current_max: i32) -> Vec<i32> {
    let mut next = current_max;
    planned
        .iter()
        .map(|p| match p.sample_number {
            Some(number) => number,
            None => {
                next += 1;
                next
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabId, UserId, VialTypeId};
    use crate::state_machine::SampleStatus;

    fn planned(number: Option<i32>) -> PlannedSample {
        PlannedSample {
            sample: NewSample {
                oms_order_id: "O1".to_string(),
                oms_request_id: "R1".to_string(),
                city_code: "BLR".to_string(),
                vial_type_id: VialTypeId(5),
                parent_sample_id: None,
                lab_id: None,
                destination_lab_id: LabId(10),
                status: SampleStatus::Default,
                barcode: None,
                visit_id: None,
                created_by: UserId(1),
            },
            metadata: SampleMetadata::for_order("O1", "BLR", 1),
            sample_number: number,
        }
    }

    #[test]
    fn test_add_sample_returns_one_based_slots() {
        let mut changes = ChangeSet::for_order("O1");
        assert!(changes.is_empty());
        assert_eq!(changes.add_sample(planned(None)), SampleSlot::Planned(1));
        assert_eq!(changes.add_sample(planned(None)), SampleSlot::Planned(2));
        assert_eq!(changes.planned_index(SampleSlot::Planned(2)), Some(1));
        assert_eq!(changes.planned_index(SampleSlot::Planned(3)), None);
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_allocation_skips_fixed_numbers() {
        let numbers = allocate_sample_numbers(&[planned(None), planned(Some(2)), planned(None)], 4);
        assert_eq!(numbers, vec![5, 2, 6]);
    }
}
