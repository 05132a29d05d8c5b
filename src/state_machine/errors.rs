use thiserror::Error;

use super::states::SampleStatus;

/// Errors raised while resolving or applying a sample transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("invalid transition from {from} on event '{event}'")]
    InvalidTransition { from: SampleStatus, event: String },

    #[error("transition guard failed: {reason}")]
    GuardFailed { reason: String },

    #[error("unknown sample status: {0}")]
    UnknownStatus(String),
}

/// Specific error type for guard checks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("missing required value: {field}")]
    MissingValue { field: &'static str },

    #[error("business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },
}

impl From<GuardError> for StateMachineError {
    fn from(err: GuardError) -> Self {
        Self::GuardFailed {
            reason: err.to_string(),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;

pub fn invalid_transition(from: SampleStatus, event: impl Into<String>) -> StateMachineError {
    StateMachineError::InvalidTransition {
        from,
        event: event.into(),
    }
}

pub fn missing_value(field: &'static str) -> GuardError {
    GuardError::MissingValue { field }
}

pub fn business_rule_violation(rule: impl Into<String>) -> GuardError {
    GuardError::BusinessRuleViolation { rule: rule.into() }
}
