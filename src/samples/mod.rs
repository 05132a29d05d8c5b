//! # Samples
//!
//! Collection-side operations on individual samples and read views over an order.

pub mod service;
pub mod types;

pub use service::SampleService;
pub use types::{
    Accession, AddBarcodesRequest, ForceCollectedRequest, MarkCollectedRequest, SampleDetails,
    TaskType, UpdateTaskSequenceRequest, VisitDetails, VolumeAdded,
};
