use crate::error::ValidationError;
use crate::mutation::{CollectionMutationEngine, EngineOptions, EngineServices, Intent};
use crate::types::{ArtifactSetPlan, ArtifactTypePlan, PlanScoped};

use super::{slot_engine, temp_id};

// ============================================================================
// Artifact sets
// ============================================================================

/// Artifact-set choices of one plan. Each entry is a 4-piece set or a 2+2
/// split of two sets.
#[derive(Clone)]
pub struct ArtifactSetsEditor {
    engine: CollectionMutationEngine<ArtifactSetPlan>,
    plan_id: String,
}

impl ArtifactSetsEditor {
    pub fn new(
        plan_id: &str,
        services: EngineServices,
        options: EngineOptions<ArtifactSetPlan>,
    ) -> Self {
        Self {
            engine: slot_engine(plan_id, services, options),
            plan_id: plan_id.to_string(),
        }
    }

    pub fn engine(&self) -> &CollectionMutationEngine<ArtifactSetPlan> {
        &self.engine
    }

    pub fn create(&self, artifact_set: &str) -> Intent {
        self.engine.create(ArtifactSetPlan {
            id: temp_id(),
            character_plan: self.plan_id.clone(),
            artifact_sets: vec![artifact_set.to_string()],
            created: None,
            updated: None,
        })
    }

    /// Turn a 4-piece entry into a 2+2 split with `artifact_set`.
    pub fn split(
        &self,
        record: &ArtifactSetPlan,
        artifact_set: &str,
    ) -> Result<Intent, ValidationError> {
        match record.artifact_sets.as_slice() {
            [existing] if existing == artifact_set => {
                Err(invalid("a set cannot be split with itself"))
            }
            [_] => Ok(self
                .engine
                .update(record, |r| r.artifact_sets.push(artifact_set.to_string()))),
            _ => Err(invalid("only a single-set entry can be split")),
        }
    }

    /// Drop `artifact_set` from an entry. Removing the only set deletes
    /// the entry.
    pub fn remove_set(
        &self,
        record: &ArtifactSetPlan,
        artifact_set: &str,
    ) -> Result<Intent, ValidationError> {
        if !record.artifact_sets.iter().any(|s| s == artifact_set) {
            return Err(invalid("set is not part of this entry"));
        }
        match record.artifact_sets.len() {
            1 => Ok(self.engine.delete(&record.id)),
            2 => Ok(self
                .engine
                .update(record, |r| r.artifact_sets.retain(|s| s != artifact_set))),
            n => Err(invalid(format!("entry holds {n} sets"))),
        }
    }

    pub fn delete(&self, id: &str) -> Intent {
        self.engine.delete(id)
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::new(ArtifactSetPlan::COLLECTION, reason)
}

// ============================================================================
// Artifact types
// ============================================================================

/// Main-stat choices per artifact slot. Entries are created and deleted,
/// never edited.
#[derive(Clone)]
pub struct ArtifactTypesEditor {
    engine: CollectionMutationEngine<ArtifactTypePlan>,
    plan_id: String,
}

impl ArtifactTypesEditor {
    pub fn new(
        plan_id: &str,
        services: EngineServices,
        options: EngineOptions<ArtifactTypePlan>,
    ) -> Self {
        Self {
            engine: slot_engine(plan_id, services, options),
            plan_id: plan_id.to_string(),
        }
    }

    pub fn engine(&self) -> &CollectionMutationEngine<ArtifactTypePlan> {
        &self.engine
    }

    pub fn create(&self, artifact_type: &str, special: &str) -> Result<Intent, ValidationError> {
        let taken = self
            .engine
            .records()
            .iter()
            .any(|r| r.artifact_type == artifact_type && r.special == special);
        if taken {
            return Err(ValidationError::new(
                ArtifactTypePlan::COLLECTION,
                format!("{special} is already chosen for {artifact_type}"),
            ));
        }
        Ok(self.engine.create(ArtifactTypePlan {
            id: temp_id(),
            character_plan: self.plan_id.clone(),
            artifact_type: artifact_type.to_string(),
            special: special.to_string(),
            created: None,
            updated: None,
        }))
    }

    pub fn delete(&self, id: &str) -> Intent {
        self.engine.delete(id)
    }
}
