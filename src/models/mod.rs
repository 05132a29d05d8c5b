//! # Data Model
//!
//! Persisted sample entities ([`Sample`], [`SampleMetadata`], [`TestSampleMapping`]) and the
//! read-mostly records they are routed against (orders, tests, labs, tasks).

pub mod ids;
pub mod lab;
pub mod order;
pub mod sample;
pub mod task;
pub mod test_detail;
pub mod test_sample_mapping;

pub use ids::{LabId, MasterTestId, SampleId, TaskId, UserId, VialTypeId};
pub use lab::{Lab, LabDirectory, LabType, MasterTest, TestLabMeta};
pub use order::{CollectionType, OrderDetails, PatientDetails};
pub use sample::{NewSample, Sample, SampleMetadata, SampleRecord};
pub use task::{NewTask, Task, TaskMetadata, TASK_STATUS_PENDING};
pub use test_detail::{TestDetail, TestDetailUpdate, TestStatus};
pub use test_sample_mapping::{
    MappingSelector, NewTestSampleMapping, SampleSlot, TestSampleMapping,
};
