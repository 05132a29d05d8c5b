//! # Collection Planner
//!
//! Turns the tests on an order into the physical samples that must be drawn: which vial,
//! in which collection sequence, carrying which tests.

pub mod collection_planner;
pub mod plan;

pub use collection_planner::{CollectionPlanner, PlanningOutcome};
pub use plan::{ordered_master_test_ids, plan_collections, PlannedCollection};
