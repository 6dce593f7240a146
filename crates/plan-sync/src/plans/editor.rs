use std::sync::Arc;
use std::time::Duration;

use crate::error::ValidationError;
use crate::mutation::{
    AllPlans, CollectionMutationEngine, EngineOptions, EngineServices, Intent,
};
use crate::patch::Patch;
use crate::types::{Plan, PLAN_EMBEDDED_FIELDS};

use super::temp_id;

/// Backend collection plans are written to.
pub const PLANS_COLLECTION: &str = "characterPlans";

pub const PLAN_DEBOUNCE: Duration = Duration::from_millis(750);

/// Server patches dropping the embedded sub-collections from plan writes.
pub fn plan_embedded_patches() -> Vec<Patch> {
    PLAN_EMBEDDED_FIELDS
        .iter()
        .map(|field| Patch::remove_field(field))
        .collect()
}

/// Top-level plan edits.
#[derive(Clone)]
pub struct PlanEditor {
    engine: CollectionMutationEngine<Plan>,
}

impl PlanEditor {
    pub fn new(services: EngineServices, debounce: Duration) -> Self {
        let options = EngineOptions {
            debounce,
            server_patches: plan_embedded_patches(),
            sort_by: Some(Arc::new(|a: &Plan, b: &Plan| a.order.cmp(&b.order))),
            disabled: false,
        };
        Self {
            engine: CollectionMutationEngine::new(PLANS_COLLECTION, AllPlans, services, options),
        }
    }

    pub fn engine(&self) -> &CollectionMutationEngine<Plan> {
        &self.engine
    }

    /// Stage a new plan for `character` after the last one.
    pub fn create(&self, user: &str, character: &str) -> Intent {
        let order = self
            .engine
            .records()
            .last()
            .map(|p| p.order + 1)
            .unwrap_or(1);
        self.engine.create(Plan::new(temp_id(), user, character, order))
    }

    pub fn update(&self, plan: &Plan, f: impl FnOnce(&mut Plan)) -> Intent {
        self.engine.update(plan, f)
    }

    pub fn delete(&self, plan_id: &str) -> Intent {
        self.engine.delete(plan_id)
    }

    pub fn reorder(&self, from: usize, to: usize) -> Result<usize, ValidationError> {
        super::reorder(&self.engine, from, to)
    }
}
