#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Sample Lifecycle Core
//!
//! Lifecycle engine for physical specimens in a diagnostics-lab order system.
//!
//! ## Overview
//!
//! Every ordered test needs one or more physical samples. This crate plans those samples
//! when an order is created or edited, tracks each one through collection, receiving,
//! LIS registration, inter-lab transfer and rejection, and keeps the per-test mappings
//! consistent with every status change.
//!
//! ## Architecture
//!
//! Workflows are plain services over an explicitly constructed [`LifecycleContext`]:
//!
//! - [`planner::CollectionPlanner`] - order tests to samples, vials and sequences
//! - [`samples::SampleService`] - barcodes, collection marks and read views
//! - [`receiving::ReceivingDesk`] - two-phase receive then route to LIS, outsource or sister lab
//! - [`rejection::RejectionService`] - full and per-test rejection
//!
//! All status changes go through [`state_machine::SampleStateMachine`]; all writes go
//! through [`store::SampleStore::apply`] as one transactional [`store::ChangeSet`].
//! Remote systems (collection sequence, master data, LIS, tickets, key-value store,
//! event bus) sit behind traits in [`clients`] and [`events`], each with an in-memory
//! implementation.
//!
//! ## Module Organization
//!
//! - [`models`] - samples, mappings, orders, tests, labs and typed ids
//! - [`store`] / [`lookups`] - persistence boundary (Postgres and in-memory)
//! - [`state_machine`] - status enum, events and transition table
//! - [`guard`] - per-order receive lock
//! - [`interlab`] - derivative samples for sister-lab transfers
//! - [`concurrency`] - wait-for-all task groups
//! - [`config`] / [`logging`] / [`database`] / [`error`] - ambient plumbing
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and in-memory integration tests
//! ```

pub mod clients;
pub mod concurrency;
pub mod config;
pub mod constants;
pub mod context;
pub mod database;
pub mod error;
pub mod events;
pub mod guard;
pub mod interlab;
pub mod logging;
pub mod lookups;
pub mod models;
pub mod planner;
pub mod receiving;
pub mod rejection;
pub mod samples;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, SampleLifecycleConfig};
pub use context::{ExternalClients, LifecycleContext};
pub use error::{Result, SampleError};
pub use events::{EventBus, EventPublisher, SampleLifecycleEvent};
pub use models::{
    LabId, MasterTestId, Sample, SampleId, SampleMetadata, SampleRecord, TaskId, TestDetail,
    TestSampleMapping, UserId, VialTypeId,
};
pub use planner::CollectionPlanner;
pub use receiving::ReceivingDesk;
pub use rejection::RejectionService;
pub use samples::SampleService;
pub use state_machine::{SampleEvent, SampleStateMachine, SampleStatus};
pub use store::{ChangeSet, SampleStore};
