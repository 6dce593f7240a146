use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::emitter::{EventEmitter, Subscription};
use crate::error::Result;
use crate::remote::{ListOptions, RemoteClient};
use crate::types::Plan;

/// Backend view listing plans with their sub-collections embedded.
pub const PLANS_VIEW: &str = "plans";

/// Shared cache of committed plans.
///
/// Copy-on-write: readers hold an `Arc` snapshot that never changes under
/// them; writers build a new vector and swap it in.
#[derive(Default)]
pub struct PlansCache {
    plans: RwLock<Arc<Vec<Plan>>>,
    changes: EventEmitter<Arc<Vec<Plan>>>,
}

impl PlansCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        Self {
            plans: RwLock::new(Arc::new(plans)),
            changes: EventEmitter::new(),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Plan>> {
        Arc::clone(&self.plans.read())
    }

    pub fn get(&self, plan_id: &str) -> Option<Plan> {
        self.plans.read().iter().find(|p| p.id == plan_id).cloned()
    }

    pub fn replace(&self, plans: Vec<Plan>) {
        let next = Arc::new(plans);
        *self.plans.write() = Arc::clone(&next);
        self.changes.emit(&next);
    }

    pub fn update(&self, f: impl FnOnce(&mut Vec<Plan>)) {
        let _ = self.try_update(|plans| {
            f(plans);
            Ok::<(), std::convert::Infallible>(())
        });
    }

    /// Apply `f` to a copy and publish it only if `f` succeeds.
    pub fn try_update<E>(
        &self,
        f: impl FnOnce(&mut Vec<Plan>) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        let next = {
            let mut guard = self.plans.write();
            let mut draft = Vec::clone(&guard);
            f(&mut draft)?;
            let next = Arc::new(draft);
            *guard = Arc::clone(&next);
            next
        };
        self.changes.emit(&next);
        Ok(())
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&Arc<Vec<Plan>>) + Send + Sync + 'static,
    ) -> Subscription {
        self.changes.subscribe(callback)
    }

    /// Reload every plan of the signed-in user from the backend view.
    pub async fn refresh(&self, remote: &dyn RemoteClient) -> Result<()> {
        let raw = remote
            .get_full_list(PLANS_VIEW, &ListOptions::sorted("order"))
            .await?;
        let mut plans = raw
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Plan>, _>>()?;
        plans.sort_by_key(|p| p.order);
        debug!(count = plans.len(), "plans refreshed");
        self.replace(plans);
        Ok(())
    }
}
