//! Dictionary sync worker.
//!
//! Keeps the reference cache in step with the backend's dictionary version.
//! The worker runs on its own task and talks to the foreground only through
//! serializable messages: [`WorkerCommand`]s in, [`WorkerEvent`]s out.

pub mod loader;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use loader::{DictionaryLoader, LoadOutcome, VersionCheck};
pub use worker::{forward_errors, DictionaryWorker, WorkerHandle, WorkerState};

/// Message shown when a refresh fails.
pub const LOAD_ERROR_MESSAGE: &str = "Dictionary loading error";

/// Commands accepted by the worker, tagged by `action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WorkerCommand {
    /// Refresh only if the server version differs.
    LoadDictionaries,
    /// Refresh unconditionally.
    ReloadDictionaries,
}

impl WorkerCommand {
    pub fn is_forced(self) -> bool {
        matches!(self, WorkerCommand::ReloadDictionaries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorAction {
    #[serde(rename = "notify-error")]
    NotifyError,
}

/// Events posted by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerEvent {
    NotifyError {
        action: ErrorAction,
        message: String,
        error: String,
    },
    Status {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl WorkerEvent {
    pub(crate) fn status(message: &str) -> Self {
        WorkerEvent::Status {
            message: message.to_string(),
            version: None,
        }
    }

    pub(crate) fn error(error: impl ToString) -> Self {
        WorkerEvent::NotifyError {
            action: ErrorAction::NotifyError,
            message: LOAD_ERROR_MESSAGE.to_string(),
            error: error.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            WorkerEvent::NotifyError { message, .. } | WorkerEvent::Status { message, .. } => {
                message
            }
        }
    }
}
