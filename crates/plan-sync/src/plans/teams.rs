use crate::error::ValidationError;
use crate::mutation::{CollectionMutationEngine, EngineOptions, EngineServices, Intent};
use crate::types::{PlanScoped, TeamPlan};

use super::{slot_engine, temp_id};

pub const MAX_TEAM_MEMBERS: usize = 3;

/// Teams planned around one character. The plan's own character is
/// implied and never stored as a member.
#[derive(Clone)]
pub struct TeamsEditor {
    engine: CollectionMutationEngine<TeamPlan>,
    plan_id: String,
    character: String,
}

impl TeamsEditor {
    pub fn new(
        plan_id: &str,
        character: &str,
        services: EngineServices,
        options: EngineOptions<TeamPlan>,
    ) -> Self {
        Self {
            engine: slot_engine(plan_id, services, options),
            plan_id: plan_id.to_string(),
            character: character.to_string(),
        }
    }

    pub fn engine(&self) -> &CollectionMutationEngine<TeamPlan> {
        &self.engine
    }

    /// Start a team with a single member.
    pub fn create(&self, member: &str) -> Result<Intent, ValidationError> {
        if member == self.character {
            return Err(invalid("the planned character is always in the team"));
        }
        Ok(self.engine.create(TeamPlan {
            id: temp_id(),
            character_plan: self.plan_id.clone(),
            characters: vec![member.to_string()],
            created: None,
            updated: None,
        }))
    }

    pub fn add_member(&self, team: &TeamPlan, member: &str) -> Result<Intent, ValidationError> {
        if member == self.character {
            return Err(invalid("the planned character is always in the team"));
        }
        if team.characters.iter().any(|c| c == member) {
            return Err(invalid(format!("{member} is already in the team")));
        }
        if team.characters.len() >= MAX_TEAM_MEMBERS {
            return Err(invalid(format!("a team has at most {MAX_TEAM_MEMBERS} members")));
        }
        Ok(self
            .engine
            .update(team, |t| t.characters.push(member.to_string())))
    }

    /// Removing the last member deletes the team.
    pub fn remove_member(&self, team: &TeamPlan, member: &str) -> Result<Intent, ValidationError> {
        if !team.characters.iter().any(|c| c == member) {
            return Err(invalid(format!("{member} is not in the team")));
        }
        if team.characters.len() == 1 {
            return Ok(self.engine.delete(&team.id));
        }
        Ok(self
            .engine
            .update(team, |t| t.characters.retain(|c| c != member)))
    }

    pub fn delete(&self, id: &str) -> Intent {
        self.engine.delete(id)
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::new(TeamPlan::COLLECTION, reason)
}
