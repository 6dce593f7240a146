use std::ops::Deref;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Anything the mutation engine can stage: a serializable record with a
/// stable id.
pub trait SyncRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

// ============================================================================
// Plans
// ============================================================================

/// A user's build configuration for one character.
///
/// The plans view returned by the backend embeds the four owned
/// sub-collections; they are stripped before a plan is written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub user: String,
    pub character: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_role: Option<String>,
    pub order: i64,
    pub constellation_current: u32,
    pub constellation_target: u32,
    pub level_current: u32,
    pub level_target: u32,
    pub talent_atk_current: u32,
    pub talent_atk_target: u32,
    pub talent_skill_current: u32,
    pub talent_skill_target: u32,
    pub talent_burst_current: u32,
    pub talent_burst_target: u32,
    #[serde(default)]
    pub substats: Vec<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_sets_plans: Vec<ArtifactSetPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_type_plans: Vec<ArtifactTypePlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weapon_plans: Vec<WeaponPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub team_plans: Vec<TeamPlan>,
}

impl Plan {
    /// A fresh plan with the default progression targets.
    pub fn new(
        id: impl Into<String>,
        user: impl Into<String>,
        character: impl Into<String>,
        order: i64,
    ) -> Self {
        Self {
            id: id.into(),
            user: user.into(),
            character: character.into(),
            character_role: None,
            order,
            constellation_current: 0,
            constellation_target: 0,
            level_current: 1,
            level_target: 90,
            talent_atk_current: 1,
            talent_atk_target: 10,
            talent_skill_current: 1,
            talent_skill_target: 10,
            talent_burst_current: 1,
            talent_burst_target: 10,
            substats: Vec::new(),
            note: String::new(),
            created: None,
            updated: None,
            artifact_sets_plans: Vec::new(),
            artifact_type_plans: Vec::new(),
            weapon_plans: Vec::new(),
            team_plans: Vec::new(),
        }
    }
}

impl SyncRecord for Plan {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSetPlan {
    pub id: String,
    pub character_plan: String,
    /// One set for a 4-piece bonus, two for a 2+2 split.
    pub artifact_sets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactTypePlan {
    pub id: String,
    pub character_plan: String,
    pub artifact_type: String,
    pub special: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponTag {
    Current,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponPlan {
    pub id: String,
    pub character_plan: String,
    pub weapon: String,
    pub level_current: u32,
    pub level_target: u32,
    pub refinement_current: u32,
    pub refinement_target: u32,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<WeaponTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPlan {
    pub id: String,
    pub character_plan: String,
    /// Up to three team members, never the plan's own character.
    pub characters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

// ============================================================================
// Sub-collection binding
// ============================================================================

/// A record owned by a plan, stored in its own backend collection and
/// embedded in the plans view under `FIELD`.
pub trait PlanScoped: SyncRecord {
    /// Backend collection name.
    const COLLECTION: &'static str;
    /// Field of the plans view that embeds this collection.
    const FIELD: &'static str;

    fn plan_id(&self) -> &str;
    fn slot(plan: &Plan) -> &Vec<Self>;
    fn slot_mut(plan: &mut Plan) -> &mut Vec<Self>;
}

macro_rules! plan_scoped {
    ($ty:ty, $collection:literal, $field:ident) => {
        impl SyncRecord for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        }

        impl PlanScoped for $ty {
            const COLLECTION: &'static str = $collection;
            const FIELD: &'static str = $collection;

            fn plan_id(&self) -> &str {
                &self.character_plan
            }

            fn slot(plan: &Plan) -> &Vec<Self> {
                &plan.$field
            }

            fn slot_mut(plan: &mut Plan) -> &mut Vec<Self> {
                &mut plan.$field
            }
        }
    };
}

plan_scoped!(ArtifactSetPlan, "artifactSetsPlans", artifact_sets_plans);
plan_scoped!(ArtifactTypePlan, "artifactTypePlans", artifact_type_plans);
plan_scoped!(WeaponPlan, "weaponPlans", weapon_plans);
plan_scoped!(TeamPlan, "teamPlans", team_plans);

/// Fields of the plans view that the `characterPlans` collection does not
/// accept on write.
pub const PLAN_EMBEDDED_FIELDS: [&str; 4] = [
    ArtifactSetPlan::FIELD,
    ArtifactTypePlan::FIELD,
    WeaponPlan::FIELD,
    TeamPlan::FIELD,
];

// ============================================================================
// Optimistic projection
// ============================================================================

/// A record as rendered: committed data overlaid with local, unconfirmed
/// edits. Derefs to the record itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimistic<T> {
    pub record: T,
    /// Carries local edits the server has not confirmed yet.
    pub is_optimistic: bool,
    /// Part of the in-flight batch; further edits must wait.
    pub is_optimistic_blocked: bool,
    /// Part of a batch that failed and awaits retry.
    pub is_optimistic_error: bool,
}

impl<T> Optimistic<T> {
    pub fn committed(record: T) -> Self {
        Self {
            record,
            is_optimistic: false,
            is_optimistic_blocked: false,
            is_optimistic_error: false,
        }
    }

    pub fn into_inner(self) -> T {
        self.record
    }
}

impl<T> Deref for Optimistic<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

// ============================================================================
// Dictionaries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub inverse_text_color: bool,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Special {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub substat: bool,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRole {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponType {
    pub id: String,
    pub name: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weapon {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub weapon_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
    pub rarity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    pub weapon_type: String,
    pub special: String,
    pub rarity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSet {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub rarity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactType {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub specials: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainOfBlessing {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_sets: Vec<String>,
}
