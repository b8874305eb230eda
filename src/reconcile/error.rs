//! Errors surfaced by identity reconciliation

use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reconciling an identity
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Neither an email nor a phone was submitted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The store could not be reached or its bounds were exceeded.
    /// Nothing was committed, so the call can be retried.
    #[error("Contact store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    /// Persisted linkage is corrupt; the unit of work was rolled back untouched
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Identify request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Identify task failed: {0}")]
    Task(String),
}

impl ReconcileError {
    /// Whether the caller may safely repeat the identify call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::StoreUnavailable(_) | ReconcileError::Timeout(_)
        )
    }
}

impl From<StorageError> for ReconcileError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            ReconcileError::StoreUnavailable(err)
        } else {
            ReconcileError::Storage(err)
        }
    }
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
