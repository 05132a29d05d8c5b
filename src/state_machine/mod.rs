//! # Sample State Machine
//!
//! Closed status enum, the event vocabulary, and the explicit transition table that every
//! status change in the crate goes through. Guards reject events that are structurally
//! incomplete (missing visit id, missing reason, unknown destination).

pub mod errors;
pub mod events;
pub mod guards;
pub mod sample_state_machine;
pub mod states;

pub use errors::{GuardError, StateMachineError, StateMachineResult};
pub use events::SampleEvent;
pub use guards::StateGuard;
pub use sample_state_machine::{can_transition, determine_target_state, SampleStateMachine};
pub use states::SampleStatus;
