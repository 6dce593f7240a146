//! Typed, read-only view over the reference cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

use super::{DictionaryTable, ReferenceStore};
use crate::error::CacheError;
use crate::types::{
    ArtifactSet, ArtifactType, Character, CharacterRole, DomainOfBlessing, Element, Special,
    Weapon, WeaponType,
};

pub trait DictionaryRecord: DeserializeOwned + Send + Sync + 'static {
    const TABLE: DictionaryTable;
    fn id(&self) -> &str;
}

macro_rules! dictionary_record {
    ($($ty:ty => $table:ident),* $(,)?) => {
        $(
            impl DictionaryRecord for $ty {
                const TABLE: DictionaryTable = DictionaryTable::$table;
                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

dictionary_record! {
    Element => Elements,
    Special => Specials,
    CharacterRole => CharacterRoles,
    WeaponType => WeaponTypes,
    Weapon => Weapons,
    Character => Characters,
    ArtifactSet => ArtifactSets,
    ArtifactType => ArtifactTypes,
    DomainOfBlessing => DomainsOfBlessing,
}

/// Items of one table plus an id lookup.
#[derive(Debug, Clone)]
pub struct DictionaryTableData<T> {
    items: Vec<T>,
    by_id: HashMap<String, usize>,
}

impl<T: DictionaryRecord> DictionaryTableData<T> {
    fn load(store: &dyn ReferenceStore) -> Result<Self, CacheError> {
        let items = store
            .get_all(T::TABLE)?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Self::from_items(items))
    }

    fn from_items(items: Vec<T>) -> Self {
        let by_id = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id().to_string(), i))
            .collect();
        Self { items, by_id }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.by_id.get(id).map(|&i| &self.items[i])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

type MissHandler = Arc<dyn Fn(DictionaryTable, &str) + Send + Sync>;

/// Snapshot of every dictionary table.
///
/// A lookup miss means the cache is older than the data referencing it. The
/// optional miss handler fires once per snapshot so the caller can ask the
/// worker for a reload.
pub struct DictionaryIndex {
    pub elements: DictionaryTableData<Element>,
    pub specials: DictionaryTableData<Special>,
    pub character_roles: DictionaryTableData<CharacterRole>,
    pub weapon_types: DictionaryTableData<WeaponType>,
    pub weapons: DictionaryTableData<Weapon>,
    pub characters: DictionaryTableData<Character>,
    pub artifact_sets: DictionaryTableData<ArtifactSet>,
    pub artifact_types: DictionaryTableData<ArtifactType>,
    pub domains_of_blessing: DictionaryTableData<DomainOfBlessing>,
    domain_by_artifact_set: HashMap<String, usize>,
    on_miss: Option<MissHandler>,
    miss_reported: AtomicBool,
}

impl DictionaryIndex {
    pub fn load(store: &dyn ReferenceStore) -> Result<Self, CacheError> {
        let mut specials = DictionaryTableData::<Special>::load(store)?.items;
        specials.sort_by_key(|s| s.order);
        let mut artifact_types = DictionaryTableData::<ArtifactType>::load(store)?.items;
        artifact_types.sort_by_key(|t| t.order);

        let domains_of_blessing = DictionaryTableData::<DomainOfBlessing>::load(store)?;
        let mut domain_by_artifact_set = HashMap::new();
        for (i, domain) in domains_of_blessing.items.iter().enumerate() {
            for set in &domain.artifact_sets {
                domain_by_artifact_set.insert(set.clone(), i);
            }
        }

        Ok(Self {
            elements: DictionaryTableData::load(store)?,
            specials: DictionaryTableData::from_items(specials),
            character_roles: DictionaryTableData::load(store)?,
            weapon_types: DictionaryTableData::load(store)?,
            weapons: DictionaryTableData::load(store)?,
            characters: DictionaryTableData::load(store)?,
            artifact_sets: DictionaryTableData::load(store)?,
            artifact_types: DictionaryTableData::from_items(artifact_types),
            domains_of_blessing,
            domain_by_artifact_set,
            on_miss: None,
            miss_reported: AtomicBool::new(false),
        })
    }

    pub fn with_miss_handler(
        mut self,
        handler: impl Fn(DictionaryTable, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_miss = Some(Arc::new(handler));
        self
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.lookup(&self.characters, id)
    }

    pub fn weapon(&self, id: &str) -> Option<&Weapon> {
        self.lookup(&self.weapons, id)
    }

    pub fn artifact_set(&self, id: &str) -> Option<&ArtifactSet> {
        self.lookup(&self.artifact_sets, id)
    }

    pub fn artifact_type(&self, id: &str) -> Option<&ArtifactType> {
        self.lookup(&self.artifact_types, id)
    }

    pub fn special(&self, id: &str) -> Option<&Special> {
        self.lookup(&self.specials, id)
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.lookup(&self.elements, id)
    }

    /// The domain dropping `artifact_set_id`, if any. Absence is normal.
    pub fn domain_for_artifact_set(&self, artifact_set_id: &str) -> Option<&DomainOfBlessing> {
        self.domain_by_artifact_set
            .get(artifact_set_id)
            .map(|&i| &self.domains_of_blessing.items[i])
    }

    fn lookup<'a, T: DictionaryRecord>(
        &self,
        table: &'a DictionaryTableData<T>,
        id: &str,
    ) -> Option<&'a T> {
        let found = table.get(id);
        if found.is_none() && !self.miss_reported.swap(true, Ordering::SeqCst) {
            warn!(table = %T::TABLE, id, "dictionary lookup miss");
            if let Some(handler) = &self.on_miss {
                handler(T::TABLE, id);
            }
        }
        found
    }
}
