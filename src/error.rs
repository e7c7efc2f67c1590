use thiserror::Error;
use uuid::Uuid;

use crate::domain::data_set::DocumentPath;

/// Failures of the on-device storage backends behind the local mirror.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Local storage is unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Local storage quota exceeded (limit: {limit} bytes, requested: {requested} bytes)")]
    QuotaExceeded { limit: usize, requested: usize },

    #[error("Local storage I/O failed for {key}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by the remote document store.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Write to {path} rejected: {reason}")]
    Rejected { path: DocumentPath, reason: String },

    #[error("Document {path} is not a JSON object")]
    MalformedDocument { path: DocumentPath },

    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Serialization failed")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Sign-in was cancelled")]
    Cancelled,

    #[error("Auth provider failure: {message}")]
    Provider { message: String },
}

/// Errors returned by the domain services for invalid requests.
///
/// Sync failures never show up here; they are logged by the sync layer.
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Not signed in")]
    SignedOut,

    #[error("Habit not found: {id}")]
    HabitNotFound { id: Uuid },

    #[error("Task not found: {id}")]
    TaskNotFound { id: Uuid },

    #[error("Subtask not found: {id}")]
    SubtaskNotFound { id: Uuid },

    #[error("{date} is outside the range of habit {id}")]
    OutsideHabitRange { id: Uuid, date: chrono::NaiveDate },

    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Invalid timer state transition: {from} -> {to}")]
    InvalidTimerTransition { from: &'static str, to: &'static str },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
