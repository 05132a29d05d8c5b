//! # Error Taxonomy
//!
//! Every fallible operation in the crate returns [`SampleError`]. The variants map onto the
//! four outcomes callers act on:
//!
//! - **Validation**: malformed or missing input. Surfaced immediately, never retried.
//! - **NotFound**: the order, sample, TRF or barcode does not exist.
//! - **Conflict**: duplicate barcode, receive already in progress, already rejected.
//! - **Upstream**: LIS, collection-sequence or master-data failure. Aborts the current
//!   order only; re-running the whole operation is safe.
//!
//! Database and internal errors are kept separate so they can be logged with more context.

use thiserror::Error;

use crate::state_machine::errors::StateMachineError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    #[error(transparent)]
    InvalidTransition(#[from] StateMachineError),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used in logs and by callers that branch on error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Upstream,
    Internal,
}

impl SampleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidTransition(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Database(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the whole operation may succeed.
    ///
    /// Validation, lookup and conflict failures are deterministic and are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::Database(_) | Self::Internal(_)
        )
    }

    /// Message without the category prefix, as shown to operators
    pub fn message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Database(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Upstream { message, .. } => message.clone(),
            Self::InvalidTransition(err) => err.to_string(),
        }
    }
}

impl From<sqlx::Error> for SampleError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict(format!("unique constraint violated: {db_err}"))
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SampleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, SampleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{SampleStatus, StateMachineError};

    #[test]
    fn test_error_kinds() {
        assert_eq!(SampleError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(SampleError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(SampleError::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(SampleError::upstream("lis", "down").kind(), ErrorKind::Upstream);
        assert_eq!(SampleError::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SampleError::upstream("lis", "timeout").is_retryable());
        assert!(!SampleError::conflict("duplicate barcode found").is_retryable());
        assert!(!SampleError::validation("lab_id is required").is_retryable());
    }

    #[test]
    fn test_transition_errors_are_validation_errors() {
        let err: SampleError = StateMachineError::InvalidTransition {
            from: SampleStatus::Deleted,
            event: "receive".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("deleted"));
    }

    #[test]
    fn test_message_strips_category() {
        let err = SampleError::upstream("lis", "visit creation failed");
        assert_eq!(err.message(), "visit creation failed");
        assert_eq!(
            err.to_string(),
            "upstream error from lis: visit creation failed"
        );
    }
}
