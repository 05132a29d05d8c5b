//! # Task Groups
//!
//! Wait-for-all fan-out. Every branch runs to completion; failures are collected as typed
//! [`BranchFailure`]s instead of cancelling siblings.

use std::fmt;
use std::future::Future;

use futures::future::join_all;
use tracing::warn;

use crate::error::{Result, SampleError};

/// One failed branch of a join
#[derive(Debug, Clone, PartialEq)]
pub struct BranchFailure {
    pub label: String,
    pub error: SampleError,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

/// Ordered failures of a wait-for-all join
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinErrors {
    failures: Vec<BranchFailure>,
}

impl JoinErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, error: SampleError) {
        self.failures.push(BranchFailure {
            label: label.into(),
            error,
        });
    }

    /// Keep the value of a successful branch, record the error of a failed one
    pub fn record<T>(&mut self, label: impl Into<String>, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(label, error);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BranchFailure> {
        self.failures.iter()
    }

    pub fn into_failures(self) -> Vec<BranchFailure> {
        self.failures
    }

    /// `Err` with the first recorded failure, if any
    pub fn into_result(self) -> Result<()> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }
}

/// Await every labeled future; returns successes in input order plus all failures
pub async fn join_all_labeled<T, F, I>(branches: I) -> (Vec<(String, T)>, JoinErrors)
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = Result<T>>,
{
    let (labels, futures): (Vec<String>, Vec<F>) = branches.into_iter().unzip();
    let results = join_all(futures).await;

    let mut successes = Vec::with_capacity(results.len());
    let mut errors = JoinErrors::new();
    for (label, result) in labels.into_iter().zip(results) {
        match result {
            Ok(value) => successes.push((label, value)),
            Err(error) => errors.push(label, error),
        }
    }
    (successes, errors)
}

/// Like [`join_all_labeled`] but each branch runs on its own tokio task
pub async fn spawn_all<T, F, I>(branches: I) -> (Vec<(String, T)>, JoinErrors)
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut labels = Vec::new();
    let mut handles = Vec::new();
    for (label, future) in branches {
        labels.push(label);
        handles.push(tokio::spawn(future));
    }

    let results = join_all(handles).await;
    let mut successes = Vec::with_capacity(results.len());
    let mut errors = JoinErrors::new();
    for (label, result) in labels.into_iter().zip(results) {
        match result {
            Ok(Ok(value)) => successes.push((label, value)),
            Ok(Err(error)) => errors.push(label, error),
            Err(join_error) => {
                warn!(branch = %label, error = %join_error, "Spawned branch did not complete");
                errors.push(
                    label,
                    SampleError::internal(format!("task did not complete: {join_error}")),
                );
            }
        }
    }
    (successes, errors)
}
