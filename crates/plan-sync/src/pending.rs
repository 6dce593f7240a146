//! Queue of plans the user asked for but the backend has not created yet.
//!
//! Each entry is created independently with a single-record create, attempted
//! immediately up to a fixed number of times, then parked as failed until the
//! user retries it. Signing out abandons every entry.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::emitter::{EventEmitter, Subscription};
use crate::error::{PlanSyncError, Result};
use crate::mutation::CREATE_STRIPPED_FIELDS;
use crate::notify::{Notification, Notifier, RetryAction};
use crate::plans::{PlansCache, PLANS_COLLECTION};
use crate::remote::{AuthEvent, AuthStore, RemoteClient};
use crate::types::Plan;

pub const DEFAULT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Waiting for its create task.
    Pending,
    /// Create request in flight.
    Sent,
    /// Automatic attempts exhausted.
    Failed,
    /// The client cancelled the create. Not an error; waits for a retry.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPlan {
    /// Local id, unique until the queue is cleared.
    pub id: u64,
    pub character: String,
    pub order: i64,
    pub state: PendingState,
    pub attempts: u32,
}

#[derive(Default)]
struct QueueState {
    items: Vec<PendingPlan>,
    latest_id: u64,
    /// Bumped by `clear`; results of older tasks are discarded.
    epoch: u64,
}

struct QueueInner {
    remote: Arc<dyn RemoteClient>,
    auth: Arc<AuthStore>,
    plans: Arc<PlansCache>,
    notifier: Arc<dyn Notifier>,
    attempts: u32,
    state: Mutex<QueueState>,
    changes: EventEmitter<Vec<PendingPlan>>,
}

#[derive(Clone)]
pub struct PendingPlanQueue {
    inner: Arc<QueueInner>,
}

impl PendingPlanQueue {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        auth: Arc<AuthStore>,
        plans: Arc<PlansCache>,
        notifier: Arc<dyn Notifier>,
        attempts: u32,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                remote,
                auth,
                plans,
                notifier,
                attempts: attempts.max(1),
                state: Mutex::new(QueueState::default()),
                changes: EventEmitter::new(),
            }),
        }
    }

    /// Queue a plan for `character` after every committed and pending plan
    /// and start creating it.
    pub fn add(&self, character: &str) -> Result<PendingPlan> {
        if self.inner.auth.record().is_none() {
            return Err(PlanSyncError::Unauthenticated);
        }
        let committed = self.inner.plans.snapshot().len();
        let (item, epoch) = {
            let mut state = self.inner.state.lock();
            state.latest_id += 1;
            let item = PendingPlan {
                id: state.latest_id,
                character: character.to_string(),
                order: (committed + state.items.len() + 1) as i64,
                state: PendingState::Pending,
                attempts: 0,
            };
            state.items.push(item.clone());
            (item, state.epoch)
        };
        debug!(id = item.id, %character, order = item.order, "plan queued");
        self.inner.publish();
        self.inner.spawn(item.id, epoch);
        Ok(item)
    }

    /// Restart a failed or aborted entry with a fresh attempt budget.
    pub fn retry(&self, id: u64) -> bool {
        self.inner.retry(id)
    }

    /// Drop every entry. In-flight creates finish but their results are
    /// discarded.
    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn items(&self) -> Vec<PendingPlan> {
        self.inner.state.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&Vec<PendingPlan>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.changes.subscribe(callback)
    }

    /// Clear the queue whenever the user signs out. Keep the returned
    /// subscription alive for as long as the binding should hold.
    pub fn bind_to_auth(&self) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        self.inner.auth.subscribe(move |event| {
            if *event == AuthEvent::SignedOut {
                if let Some(inner) = weak.upgrade() {
                    info!("signed out; abandoning pending plans");
                    inner.clear();
                }
            }
        })
    }
}

impl QueueInner {
    fn publish(&self) {
        let items = self.state.lock().items.clone();
        self.changes.emit(&items);
    }

    fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.items.clear();
            state.latest_id = 0;
            state.epoch += 1;
        }
        self.publish();
    }

    fn retry(self: &Arc<Self>, id: u64) -> bool {
        let epoch = {
            let mut state = self.state.lock();
            let epoch = state.epoch;
            let parked = |p: &PendingPlan| {
                p.id == id && matches!(p.state, PendingState::Failed | PendingState::Aborted)
            };
            match state.items.iter_mut().find(|p| parked(p)) {
                Some(item) => {
                    item.state = PendingState::Pending;
                    item.attempts = 0;
                    epoch
                }
                None => return false,
            }
        };
        self.publish();
        self.spawn(id, epoch);
        true
    }

    fn spawn(self: &Arc<Self>, id: u64, epoch: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.run(id, epoch).await });
    }

    /// Mutate entry `id` if it still belongs to `epoch`.
    fn with_item<R>(&self, id: u64, epoch: u64, f: impl FnOnce(&mut PendingPlan) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }
        state.items.iter_mut().find(|p| p.id == id).map(f)
    }

    async fn run(self: Arc<Self>, id: u64, epoch: u64) {
        loop {
            let Some((character, order)) = self.with_item(id, epoch, |item| {
                item.state = PendingState::Sent;
                item.attempts += 1;
                (item.character.clone(), item.order)
            }) else {
                return;
            };
            self.publish();

            let Some(user) = self.auth.record() else {
                warn!(id, "signed out before the plan was sent");
                self.fail(id, epoch, &character, "Not authenticated");
                return;
            };
            let result = self.create(&user.id, &character, order).await;

            match result {
                Ok(plan) => {
                    let removed = {
                        let mut state = self.state.lock();
                        if state.epoch != epoch {
                            debug!(id, "discarding plan created for a cleared queue");
                            return;
                        }
                        let before = state.items.len();
                        state.items.retain(|p| p.id != id);
                        before != state.items.len()
                    };
                    if removed {
                        info!(id, plan_id = %plan.id, %character, "plan created");
                        self.plans.update(|plans| {
                            plans.push(plan);
                            plans.sort_by_key(|p| p.order);
                        });
                        self.publish();
                        self.notifier.notify(Notification::PlanCreated { character });
                    }
                    return;
                }
                Err(PlanSyncError::Remote(e)) if e.is_abort => {
                    debug!(id, "plan creation aborted");
                    let parked = self.with_item(id, epoch, |item| {
                        item.state = PendingState::Aborted;
                        item.attempts = item.attempts.saturating_sub(1);
                    });
                    if parked.is_some() {
                        self.publish();
                    }
                    return;
                }
                Err(e) => {
                    let attempts = self.with_item(id, epoch, |item| item.attempts);
                    match attempts {
                        None => return,
                        Some(n) if n < self.attempts => {
                            warn!(id, attempt = n, error = %e, "plan creation failed; retrying");
                        }
                        Some(n) => {
                            error!(id, attempts = n, error = %e, "plan creation failed");
                            self.fail(id, epoch, &character, &describe(&e));
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn create(&self, user: &str, character: &str, order: i64) -> Result<Plan> {
        let mut body = serde_json::to_value(Plan::new("", user, character, order))?;
        if let Some(map) = body.as_object_mut() {
            for field in CREATE_STRIPPED_FIELDS {
                map.remove(field);
            }
        }
        let created = self.remote.create(PLANS_COLLECTION, &body).await?;
        Ok(serde_json::from_value(created)?)
    }

    fn fail(self: &Arc<Self>, id: u64, epoch: u64, character: &str, description: &str) {
        if self
            .with_item(id, epoch, |item| item.state = PendingState::Failed)
            .is_none()
        {
            return;
        }
        self.publish();
        let weak: Weak<QueueInner> = Arc::downgrade(self);
        self.notifier.notify(Notification::PlanCreateFailed {
            character: character.to_string(),
            description: description.to_string(),
            retry: RetryAction::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.retry(id);
                }
            }),
        });
    }
}

/// User-facing text for a failed create.
fn describe(e: &PlanSyncError) -> String {
    match e {
        PlanSyncError::Remote(remote) => remote.message.clone(),
        other => other.to_string(),
    }
}
