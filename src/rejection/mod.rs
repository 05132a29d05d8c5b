//! # Rejection
//!
//! Full (by barcode) and partial (per test) rejection of collected samples.

pub mod service;
pub mod types;

pub use service::RejectionService;
pub use types::{PartialRejectionRequest, RejectSampleRequest, RejectionOutcome};
