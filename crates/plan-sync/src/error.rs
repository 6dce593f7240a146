use std::fmt;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Error returned by the remote data client.
///
/// `is_abort` marks client-side cancellation (navigation, logout, unmount).
/// Aborts are never surfaced to the user and never put a batch into the
/// error state.
#[derive(Debug, Clone, Error)]
#[error("{message} (status {status})")]
pub struct RemoteError {
    pub status: u16,
    pub is_abort: bool,
    pub message: String,
    /// Raw response payload as sent by the backend.
    pub data: Value,
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            is_abort: false,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// A client-cancelled request.
    pub fn aborted() -> Self {
        Self {
            status: 0,
            is_abort: true,
            message: "The request was aborted.".to_string(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Batch failures carry the first failing sub-request under
    /// `data.requests[0]` (or `data.requests["0"]`). Returns that inner error
    /// when present, otherwise a copy of `self`.
    pub fn unwrap_batch(&self) -> RemoteError {
        let requests = &self.data["data"]["requests"];
        let first = match requests {
            Value::Array(items) => items.first(),
            Value::Object(map) => map.get("0"),
            _ => None,
        };
        let Some(first) = first else {
            return self.clone();
        };

        let response = first.get("response").unwrap_or(first);
        let status = response
            .get("status")
            .and_then(Value::as_u64)
            .map(|s| s as u16)
            .unwrap_or(self.status);
        let message = response
            .get("message")
            .or_else(|| first.get("message"))
            .and_then(Value::as_str)
            .unwrap_or(&self.message)
            .to_string();

        RemoteError {
            status,
            is_abort: false,
            message,
            data: response.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unknown dictionary table \"{0}\"")]
    UnknownTable(String),

    #[error("Record in table \"{table}\" has no string \"id\" field")]
    MissingId { table: String },

    #[error("Failed to (de)serialize cached record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache task failed: {0}")]
    Task(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A domain rule rejected a sub-collection edit before anything was staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub collection: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {} edit: {}", self.collection, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// PlanSyncError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlanSyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Patch(#[from] crate::patch::PatchError),

    #[error(transparent)]
    Reconcile(#[from] crate::mutation::reconcile::ReconcileError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Crate result; the error defaults to `PlanSyncError`.
pub type Result<T, E = PlanSyncError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
