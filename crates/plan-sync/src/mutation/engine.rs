//! Debounced async driver around [`MutationState`].
//!
//! One engine per `(collection, scope)`. Intents are applied synchronously;
//! a debounce timer (reset by every intent) moves staged work into a batch
//! and sends it as one request. Results are reconciled into the shared
//! [`PlansCache`]. Failures become state plus a notification, never a
//! returned error.
//!
//! Locks are never held across a notifier call, an emitter callback or a
//! plans-cache write, so those callbacks may call back into the engine.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{AbortHandle, Abortable, Aborted};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::reconcile::{reconcile, ReconcileError};
use super::state::{diff_record, Intent, MutationState, SortHook, Staged};
use crate::emitter::{EventEmitter, Subscription};
use crate::error::RemoteError;
use crate::notify::{Notification, Notifier, RetryAction};
use crate::patch::Patch;
use crate::plans::PlansCache;
use crate::registry::{PendingStatusRegistry, PlanStatus};
use crate::remote::{BatchRequest, BatchResponse, RemoteClient};
use crate::types::{Optimistic, Plan, PlanScoped, SyncRecord};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(450);

/// Shown by the host before navigating away from unsynced edits.
pub const LEAVE_PROMPT: &str = "Are you sure you want to leave?";

// ============================================================================
// Collection access
// ============================================================================

/// Where an engine's committed records live inside the plans cache, and
/// which plan ids its flags are reported under.
pub trait CollectionAccess<T>: Send + Sync + 'static {
    fn records<'a>(&self, plans: &'a [Plan]) -> Option<&'a [T]>;

    fn records_mut<'a>(&self, plans: &'a mut Vec<Plan>) -> Option<&'a mut Vec<T>>;

    /// Registry entries for the given state, keyed by plan id.
    fn status_targets(&self, state: &MutationState<T>) -> HashMap<String, PlanStatus>;
}

/// The plans list itself. Flags are reported per touched plan.
pub struct AllPlans;

impl CollectionAccess<Plan> for AllPlans {
    fn records<'a>(&self, plans: &'a [Plan]) -> Option<&'a [Plan]> {
        Some(plans)
    }

    fn records_mut<'a>(&self, plans: &'a mut Vec<Plan>) -> Option<&'a mut Vec<Plan>> {
        Some(plans)
    }

    fn status_targets(&self, state: &MutationState<Plan>) -> HashMap<String, PlanStatus> {
        let status = PlanStatus {
            is_pending: state.is_pending(),
            is_error: state.is_error(),
        };
        let current = state.current().map(|b| &b.staged);
        current
            .into_iter()
            .flat_map(|staged| staged.ids())
            .chain(state.staged().ids())
            .map(|id| (id.to_string(), status))
            .collect()
    }
}

/// One sub-collection of one plan.
pub struct PlanSlot<T> {
    plan_id: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> PlanSlot<T> {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            _record: PhantomData,
        }
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }
}

impl<T: PlanScoped> CollectionAccess<T> for PlanSlot<T> {
    fn records<'a>(&self, plans: &'a [Plan]) -> Option<&'a [T]> {
        plans
            .iter()
            .find(|p| p.id == self.plan_id)
            .map(|p| T::slot(p).as_slice())
    }

    fn records_mut<'a>(&self, plans: &'a mut Vec<Plan>) -> Option<&'a mut Vec<T>> {
        plans
            .iter_mut()
            .find(|p| p.id == self.plan_id)
            .map(T::slot_mut)
    }

    fn status_targets(&self, state: &MutationState<T>) -> HashMap<String, PlanStatus> {
        let status = PlanStatus {
            is_pending: state.is_pending(),
            is_error: state.is_error(),
        };
        let mut targets = HashMap::new();
        if status != PlanStatus::default() {
            targets.insert(self.plan_id.clone(), status);
        }
        targets
    }
}

// ============================================================================
// Options & services
// ============================================================================

pub struct EngineOptions<T> {
    pub debounce: Duration,
    /// Applied to every outgoing create and update body.
    pub server_patches: Vec<Patch>,
    pub sort_by: Option<SortHook<T>>,
    /// Hold dispatch until re-enabled.
    pub disabled: bool,
}

impl<T> Default for EngineOptions<T> {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            server_patches: Vec::new(),
            sort_by: None,
            disabled: false,
        }
    }
}

impl<T> Clone for EngineOptions<T> {
    fn clone(&self) -> Self {
        Self {
            debounce: self.debounce,
            server_patches: self.server_patches.clone(),
            sort_by: self.sort_by.clone(),
            disabled: self.disabled,
        }
    }
}

/// Shared collaborators every engine needs.
#[derive(Clone)]
pub struct EngineServices {
    pub remote: Arc<dyn RemoteClient>,
    pub plans: Arc<PlansCache>,
    pub registry: Arc<PendingStatusRegistry>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub is_pending: bool,
    pub is_error: bool,
}

// ============================================================================
// CollectionMutationEngine
// ============================================================================

pub struct CollectionMutationEngine<T: SyncRecord> {
    inner: Arc<Inner<T>>,
}

impl<T: SyncRecord> Clone for CollectionMutationEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T: SyncRecord> {
    collection: String,
    access: Box<dyn CollectionAccess<T>>,
    services: EngineServices,
    debounce: Duration,
    server_patches: Vec<Patch>,
    sort_by: Option<SortHook<T>>,
    core: Mutex<Core<T>>,
    changes: EventEmitter<EngineStatus>,
}

struct Core<T> {
    state: MutationState<T>,
    disabled: bool,
    /// Bumped by every intent; a timer only fires for its own generation.
    debounce_gen: u64,
    /// Bumped by every dispatch; completions of older dispatches are dropped.
    dispatch_seq: u64,
    in_flight: Option<AbortHandle>,
    reported: HashMap<String, PlanStatus>,
}

type BatchOutcome = Result<Result<Vec<BatchResponse>, RemoteError>, Aborted>;

impl<T: SyncRecord> CollectionMutationEngine<T> {
    pub fn new(
        collection: impl Into<String>,
        access: impl CollectionAccess<T>,
        services: EngineServices,
        options: EngineOptions<T>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                collection: collection.into(),
                access: Box::new(access),
                services,
                debounce: options.debounce,
                server_patches: options.server_patches,
                sort_by: options.sort_by,
                core: Mutex::new(Core {
                    state: MutationState::new(),
                    disabled: options.disabled,
                    debounce_gen: 0,
                    dispatch_seq: 0,
                    in_flight: None,
                    reported: HashMap::new(),
                }),
                changes: EventEmitter::new(),
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    // ------------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------------

    pub fn create(&self, record: T) -> Intent {
        let id = record.id().to_string();
        let intent = self.inner.core.lock().state.create(record);
        self.inner.after_intent("create", &id, intent);
        intent
    }

    /// Stage the changes `f` makes to `record`.
    pub fn update(&self, record: &T, f: impl FnOnce(&mut T)) -> Intent {
        let intent = match diff_record(record, f) {
            Ok(patches) => self.inner.core.lock().state.update(record, patches),
            Err(e) => Err(e),
        };
        let intent = intent.unwrap_or_else(|e| {
            error!(collection = %self.inner.collection, id = record.id(), error = %e, "failed to stage update");
            Intent::Ignored("patch failed")
        });
        self.inner.after_intent("update", record.id(), intent);
        intent
    }

    pub fn delete(&self, id: &str) -> Intent {
        let intent = self.inner.core.lock().state.delete(id);
        self.inner.after_intent("delete", id, intent);
        intent
    }

    /// Re-send a failed batch together with everything staged since.
    pub fn retry(&self) {
        self.inner.retry();
    }

    /// Dispatch now instead of waiting for the debounce timer.
    pub fn flush(&self) {
        let failure = {
            let mut core = self.inner.core.lock();
            core.debounce_gen += 1;
            self.inner.dispatch(&mut core)
        };
        self.inner.settle(failure);
    }

    /// Abort the request on the wire. The batch is parked, not failed.
    pub fn cancel(&self) {
        if let Some(handle) = self.inner.core.lock().in_flight.take() {
            handle.abort();
        }
    }

    pub fn set_disabled(&self, disabled: bool) {
        let failure = {
            let mut core = self.inner.core.lock();
            core.disabled = disabled;
            if disabled {
                None
            } else {
                self.inner.dispatch(&mut core)
            }
        };
        self.inner.settle(failure);
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Committed records overlaid with unconfirmed intents.
    pub fn records(&self) -> Vec<Optimistic<T>> {
        let plans = self.inner.services.plans.snapshot();
        let committed = self.inner.access.records(&plans).unwrap_or(&[]);
        self.inner
            .core
            .lock()
            .state
            .project(committed, self.inner.sort_by.as_ref())
    }

    pub fn status(&self) -> EngineStatus {
        status_of(&self.inner.core.lock().state)
    }

    pub fn is_pending(&self) -> bool {
        self.status().is_pending
    }

    pub fn is_error(&self) -> bool {
        self.status().is_error
    }

    /// Copy of the state machine, for inspection.
    pub fn state(&self) -> MutationState<T> {
        self.inner.core.lock().state.clone()
    }

    /// Navigation guard. With unsynced work, asks `confirm` with
    /// [`LEAVE_PROMPT`]; returns true when navigation must be blocked.
    pub fn should_block_leave(&self, confirm: impl FnOnce(&str) -> bool) -> bool {
        if !self.inner.core.lock().state.has_unsynced() {
            return false;
        }
        !confirm(LEAVE_PROMPT)
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&EngineStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.changes.subscribe(callback)
    }
}

fn status_of<T: SyncRecord>(state: &MutationState<T>) -> EngineStatus {
    EngineStatus {
        is_pending: state.is_pending(),
        is_error: state.is_error(),
    }
}

impl<T: SyncRecord> Inner<T> {
    fn after_intent(self: &Arc<Self>, kind: &str, id: &str, intent: Intent) {
        debug!(collection = %self.collection, kind, id, ?intent, "intent");
        if let Intent::Ignored(reason) = intent {
            if reason != "no changes" {
                warn!(collection = %self.collection, kind, id, reason, "intent ignored");
            }
        } else {
            self.arm_debounce();
        }
        self.publish();
    }

    fn arm_debounce(self: &Arc<Self>) {
        let generation = {
            let mut core = self.core.lock();
            core.debounce_gen += 1;
            core.debounce_gen
        };
        let weak = Arc::downgrade(self);
        let delay = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_debounce(generation);
            }
        });
    }

    fn on_debounce(self: &Arc<Self>, generation: u64) {
        let failure = {
            let mut core = self.core.lock();
            if core.debounce_gen != generation {
                return;
            }
            self.dispatch(&mut core)
        };
        self.settle(failure);
    }

    fn retry(self: &Arc<Self>) {
        let failure = {
            let mut core = self.core.lock();
            match core.state.retry() {
                Ok(true) => {
                    debug!(collection = %self.collection, "retrying batch");
                    core.debounce_gen += 1;
                    self.dispatch(&mut core)
                }
                Ok(false) => None,
                Err(e) => {
                    error!(collection = %self.collection, error = %e, "failed to merge staged intents");
                    None
                }
            }
        };
        self.settle(failure);
    }

    /// Send the scheduled batch, if any. Called with the core lock held;
    /// only spawns, never awaits. Returns a message when the batch could
    /// not be built and went straight to the error state.
    fn dispatch(self: &Arc<Self>, core: &mut Core<T>) -> Option<String> {
        if core.disabled {
            return None;
        }
        match core.state.prepare_batch() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                error!(collection = %self.collection, error = %e, "failed to prepare batch");
                return None;
            }
        }
        let requests = core
            .state
            .current()
            .map(|batch| batch.staged.to_requests(&self.collection, &self.server_patches))?;
        core.state.mark_dispatched();
        let requests: Vec<BatchRequest> = match requests {
            Ok(requests) => requests,
            Err(e) => {
                error!(collection = %self.collection, error = %e, "failed to build batch requests");
                core.state.mark_error();
                return Some(e.to_string());
            }
        };

        core.dispatch_seq += 1;
        let seq = core.dispatch_seq;
        let (abort, registration) = AbortHandle::new_pair();
        core.in_flight = Some(abort);
        debug!(collection = %self.collection, seq, count = requests.len(), "dispatching batch");

        let remote = Arc::clone(&self.services.remote);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let send = async move { remote.send_batch(&requests).await };
            let outcome = Abortable::new(send, registration).await;
            if let Some(inner) = weak.upgrade() {
                inner.complete(seq, outcome);
            }
        });
        None
    }

    /// Publish after a state change, raising a sync error if one occurred.
    fn settle(self: &Arc<Self>, failure: Option<String>) {
        if let Some(message) = failure {
            self.notify_failure(message);
        }
        self.publish();
    }

    fn notify_failure(self: &Arc<Self>, message: String) {
        let weak: Weak<Inner<T>> = Arc::downgrade(self);
        self.services.notifier.notify(Notification::SyncError {
            collection: self.collection.clone(),
            message,
            retry: RetryAction::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.retry();
                }
            }),
        });
    }

    fn complete(self: &Arc<Self>, seq: u64, outcome: BatchOutcome) {
        let outcome = match outcome {
            Ok(Ok(results)) => match first_failed(&results) {
                Some(err) => Ok(Err(err)),
                None => Ok(Ok(results)),
            },
            other => other,
        };

        match outcome {
            Ok(Ok(results)) => {
                let done = {
                    let mut core = self.core.lock();
                    if core.dispatch_seq != seq {
                        return;
                    }
                    core.in_flight = None;
                    core.state.finish()
                };
                if let Some(done) = done {
                    self.apply_results(&done, &results);
                }
                let leftover = !self.core.lock().state.staged().is_empty();
                if leftover {
                    self.arm_debounce();
                }
            }
            Ok(Err(err)) if !err.is_abort => {
                {
                    let mut core = self.core.lock();
                    if core.dispatch_seq != seq {
                        return;
                    }
                    core.in_flight = None;
                    core.state.mark_error();
                }
                let err = err.unwrap_batch();
                error!(collection = %self.collection, status = err.status, error = %err, "batch failed");
                self.notify_failure(err.message);
            }
            _ => {
                let mut core = self.core.lock();
                if core.dispatch_seq != seq {
                    return;
                }
                core.in_flight = None;
                core.state.mark_aborted();
                debug!(collection = %self.collection, seq, "batch aborted");
            }
        }
        self.publish();
    }

    fn apply_results(&self, done: &Staged<T>, results: &[BatchResponse]) {
        let applied = self.services.plans.try_update(|plans| {
            let target =
                self.access
                    .records_mut(plans)
                    .ok_or_else(|| ReconcileError::ScopeNotFound {
                        collection: self.collection.clone(),
                    })?;
            reconcile(
                &self.collection,
                done,
                results,
                target,
                self.sort_by.as_ref(),
            )
        });
        if let Err(e) = applied {
            error!(collection = %self.collection, error = %e, "failed to reconcile batch results");
        }
    }

    /// Push flags to the registry and notify subscribers.
    fn publish(&self) {
        let (status, targets, stale) = {
            let mut core = self.core.lock();
            let targets = self.access.status_targets(&core.state);
            let stale: Vec<String> = core
                .reported
                .keys()
                .filter(|id| !targets.contains_key(*id))
                .cloned()
                .collect();
            core.reported = targets.clone();
            (status_of(&core.state), targets, stale)
        };
        let registry = &self.services.registry;
        for plan_id in stale {
            registry.report(&plan_id, &self.collection, PlanStatus::default());
        }
        for (plan_id, status) in targets {
            registry.report(&plan_id, &self.collection, status);
        }
        self.changes.emit(&status);
    }
}

impl<T: SyncRecord> Drop for Inner<T> {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Some(handle) = core.in_flight.take() {
            handle.abort();
        }
        for plan_id in core.reported.keys() {
            self.services
                .registry
                .report(plan_id, &self.collection, PlanStatus::default());
        }
    }
}

/// A batch answered with per-request statuses; any non-success entry fails
/// the whole batch.
fn first_failed(results: &[BatchResponse]) -> Option<RemoteError> {
    results
        .iter()
        .find(|r| r.status >= 400)
        .map(|r| {
            let message = r
                .body
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("Batch request failed.")
                .to_string();
            RemoteError::new(r.status, message).with_data(r.body.clone())
        })
}
