use std::sync::Arc;

use crate::error::ValidationError;
use crate::mutation::{CollectionMutationEngine, EngineOptions, EngineServices, Intent};
use crate::types::{PlanScoped, WeaponPlan, WeaponTag};

use super::{reorder, slot_engine, temp_id};

/// Weapon choices of one plan, kept in user order.
#[derive(Clone)]
pub struct WeaponsEditor {
    engine: CollectionMutationEngine<WeaponPlan>,
    plan_id: String,
}

impl WeaponsEditor {
    /// `options.sort_by` defaults to ascending `order`.
    pub fn new(
        plan_id: &str,
        services: EngineServices,
        mut options: EngineOptions<WeaponPlan>,
    ) -> Self {
        if options.sort_by.is_none() {
            options.sort_by = Some(Arc::new(|a: &WeaponPlan, b: &WeaponPlan| a.order.cmp(&b.order)));
        }
        Self {
            engine: slot_engine(plan_id, services, options),
            plan_id: plan_id.to_string(),
        }
    }

    pub fn engine(&self) -> &CollectionMutationEngine<WeaponPlan> {
        &self.engine
    }

    /// Add `weapon` at the end with full progression targets.
    pub fn create(&self, weapon: &str) -> Result<Intent, ValidationError> {
        let records = self.engine.records();
        if records.iter().any(|w| w.weapon == weapon) {
            return Err(ValidationError::new(
                WeaponPlan::COLLECTION,
                format!("{weapon} is already planned"),
            ));
        }
        Ok(self.engine.create(WeaponPlan {
            id: temp_id(),
            character_plan: self.plan_id.clone(),
            weapon: weapon.to_string(),
            level_current: 0,
            level_target: 90,
            refinement_current: 1,
            refinement_target: 5,
            order: records.len() as i64 + 1,
            tag: None,
            created: None,
            updated: None,
        }))
    }

    pub fn update(&self, record: &WeaponPlan, f: impl FnOnce(&mut WeaponPlan)) -> Intent {
        self.engine.update(record, f)
    }

    /// Mark the weapon as currently equipped or as the target, or clear it.
    pub fn set_tag(&self, record: &WeaponPlan, tag: Option<WeaponTag>) -> Intent {
        self.engine.update(record, |w| w.tag = tag)
    }

    pub fn delete(&self, id: &str) -> Intent {
        self.engine.delete(id)
    }

    pub fn reorder(&self, from: usize, to: usize) -> Result<usize, ValidationError> {
        reorder(&self.engine, from, to)
    }
}
