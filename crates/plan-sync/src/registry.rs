//! Shared pending-status registry.
//!
//! Many mutation engines (one per sub-collection and plan, plus the plan
//! engine itself) report their pending/error flags here under a reporter
//! key. Consumers only ever see the aggregate `(is_pending, is_error)` per
//! plan id. Entries whose both sets are empty are pruned.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::emitter::{EventEmitter, Subscription};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanStatus {
    pub is_pending: bool,
    pub is_error: bool,
}

/// Published whenever a plan's aggregate status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub plan_id: String,
    pub status: PlanStatus,
}

#[derive(Debug, Default)]
struct Entry {
    pending: HashSet<String>,
    error: HashSet<String>,
}

impl Entry {
    fn status(&self) -> PlanStatus {
        PlanStatus {
            is_pending: !self.pending.is_empty(),
            is_error: !self.error.is_empty(),
        }
    }
}

#[derive(Default)]
pub struct PendingStatusRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    changes: EventEmitter<StatusChange>,
}

impl PendingStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending(&self, plan_id: &str, reporter: &str) {
        self.mutate(plan_id, |e| {
            e.pending.insert(reporter.to_string());
        });
    }

    pub fn delete_pending(&self, plan_id: &str, reporter: &str) {
        self.mutate(plan_id, |e| {
            e.pending.remove(reporter);
        });
    }

    pub fn set_error(&self, plan_id: &str, reporter: &str) {
        self.mutate(plan_id, |e| {
            e.error.insert(reporter.to_string());
        });
    }

    pub fn delete_error(&self, plan_id: &str, reporter: &str) {
        self.mutate(plan_id, |e| {
            e.error.remove(reporter);
        });
    }

    /// Set or clear both of `reporter`'s flags for `plan_id` at once.
    pub fn report(&self, plan_id: &str, reporter: &str, status: PlanStatus) {
        self.mutate(plan_id, |e| {
            if status.is_pending {
                e.pending.insert(reporter.to_string());
            } else {
                e.pending.remove(reporter);
            }
            if status.is_error {
                e.error.insert(reporter.to_string());
            } else {
                e.error.remove(reporter);
            }
        });
    }

    pub fn status(&self, plan_id: &str) -> PlanStatus {
        self.entries
            .lock()
            .get(plan_id)
            .map(Entry::status)
            .unwrap_or_default()
    }

    /// Number of plans with at least one flag set.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&StatusChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.changes.subscribe(callback)
    }

    fn mutate(&self, plan_id: &str, f: impl FnOnce(&mut Entry)) {
        let (before, after) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(plan_id.to_string()).or_default();
            let before = entry.status();
            f(entry);
            let after = entry.status();
            if entry.pending.is_empty() && entry.error.is_empty() {
                entries.remove(plan_id);
            }
            (before, after)
        };
        if before != after {
            self.changes.emit(&StatusChange {
                plan_id: plan_id.to_string(),
                status: after,
            });
        }
    }
}
