//! Plans: the shared committed cache and the editors built on the mutation
//! engine for plans and their owned sub-collections.

pub mod artifacts;
pub mod cache;
pub mod editor;
pub mod teams;
pub mod weapons;

use crate::error::ValidationError;
use crate::mutation::{
    CollectionMutationEngine, EngineOptions, EngineServices, Intent, PlanSlot,
};
use crate::types::{Plan, PlanScoped, SyncRecord, WeaponPlan};

pub use artifacts::{ArtifactSetsEditor, ArtifactTypesEditor};
pub use cache::{PlansCache, PLANS_VIEW};
pub use editor::{plan_embedded_patches, PlanEditor, PLANS_COLLECTION, PLAN_DEBOUNCE};
pub use teams::{TeamsEditor, MAX_TEAM_MEMBERS};
pub use weapons::WeaponsEditor;

/// Engine over one plan's sub-collection of `T`.
pub fn slot_engine<T: PlanScoped>(
    plan_id: &str,
    services: EngineServices,
    options: EngineOptions<T>,
) -> CollectionMutationEngine<T> {
    CollectionMutationEngine::new(T::COLLECTION, PlanSlot::<T>::new(plan_id), services, options)
}

/// Temporary id for an optimistic create; the server assigns the real one.
pub(crate) fn temp_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Ordering
// ============================================================================

/// Records the user can drag into a custom order.
pub trait Ordered: SyncRecord {
    fn order(&self) -> i64;
    fn set_order(&mut self, order: i64);
}

impl Ordered for Plan {
    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
}

impl Ordered for WeaponPlan {
    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
}

/// Move the record at `from` to `to` in the engine's current view and
/// renumber everything `1..=n`. One `order` update is staged per record
/// whose position changed. Returns the number of staged updates.
pub fn reorder<T: Ordered>(
    engine: &CollectionMutationEngine<T>,
    from: usize,
    to: usize,
) -> Result<usize, ValidationError> {
    let mut records: Vec<T> = engine.records().into_iter().map(|r| r.record).collect();
    if from >= records.len() || to >= records.len() {
        return Err(ValidationError::new(
            engine.collection(),
            format!("cannot move {from} to {to} in a list of {}", records.len()),
        ));
    }
    let moved = records.remove(from);
    records.insert(to, moved);

    let mut staged = 0;
    for (i, record) in records.iter().enumerate() {
        let order = i as i64 + 1;
        if record.order() == order {
            continue;
        }
        if !matches!(engine.update(record, |r| r.set_order(order)), Intent::Ignored(_)) {
            staged += 1;
        }
    }
    Ok(staged)
}
