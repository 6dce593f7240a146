//! User-facing notifications raised by the sync core.
//!
//! The core never renders anything; it hands [`Notification`]s to a
//! [`Notifier`] supplied by the host. Actions are plain callbacks.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

/// Callback attached to a notification button.
#[derive(Clone)]
pub struct RetryAction(Arc<dyn Fn() + Send + Sync>);

impl RetryAction {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn run(&self) {
        (self.0)()
    }
}

impl fmt::Debug for RetryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryAction")
    }
}

#[derive(Debug, Clone)]
pub enum Notification {
    /// A mutation batch failed. Stays until dismissed; `retry` re-arms it.
    SyncError {
        collection: String,
        message: String,
        retry: RetryAction,
    },
    /// Reference data could not be refreshed. Never auto-dismissed; the
    /// only offered action is a full reload.
    DictionaryError {
        message: String,
        error: String,
        reload: RetryAction,
    },
    PlanCreated { character: String },
    /// A new plan exhausted its automatic attempts.
    PlanCreateFailed {
        character: String,
        description: String,
        retry: RetryAction,
    },
}

impl Notification {
    /// Whether the host must keep the notification until the user acts.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Notification::PlanCreated { .. })
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs notifications. Default when the host supplies nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::SyncError {
                collection,
                message,
                ..
            } => error!(collection, message, "sync error"),
            Notification::DictionaryError { message, error, .. } => {
                error!(message, error, "dictionary error; consider reloading page")
            }
            Notification::PlanCreated { character } => info!(character, "plan created"),
            Notification::PlanCreateFailed {
                character,
                description,
                ..
            } => error!(character, description, "plan creation failed"),
        }
    }
}

/// Keeps every notification; handy for hosts that poll and for tests.
#[derive(Default)]
pub struct CollectingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
