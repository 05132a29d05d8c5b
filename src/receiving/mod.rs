//! # Receiving
//!
//! The receiving desk workflow: looking up the samples a lab is waiting for, receiving
//! batches of them, and recording samples that never arrived.

pub mod receiving_desk;
pub mod routing;
pub mod types;

pub use receiving_desk::ReceivingDesk;
pub use routing::{classify, sample_number_routes, RoutedSamples};
pub use types::{
    CollectedSample, CollectedSamplesRequest, CollectedSamplesResponse, LabSummary,
    MarkNotReceivedRequest, OrderFailure, PatientSummary, ReceiveSample, ReceiveSamplesRequest,
    ReceiveSummary, SearchType, TestSummary,
};
