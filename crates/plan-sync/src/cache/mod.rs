//! Local reference cache.
//!
//! A versioned table store holding dictionary snapshots. Written only by the
//! dictionary worker; everything else reads. Records are raw JSON objects
//! keyed by their server-assigned `id`; [`DictionaryIndex`] provides the typed
//! view.

pub mod index;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::CacheError;

pub use index::{DictionaryIndex, DictionaryRecord, DictionaryTableData};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Key of the `config` entry holding the last applied dictionary version.
pub const DICTIONARY_VERSION_KEY: &str = "dictionaryVersion";

// ============================================================================
// DictionaryTable
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryTable {
    Elements,
    Specials,
    CharacterRoles,
    WeaponTypes,
    Weapons,
    Characters,
    ArtifactSets,
    ArtifactTypes,
    DomainsOfBlessing,
}

impl DictionaryTable {
    pub const ALL: [DictionaryTable; 9] = [
        DictionaryTable::Elements,
        DictionaryTable::Specials,
        DictionaryTable::CharacterRoles,
        DictionaryTable::WeaponTypes,
        DictionaryTable::Weapons,
        DictionaryTable::Characters,
        DictionaryTable::ArtifactSets,
        DictionaryTable::ArtifactTypes,
        DictionaryTable::DomainsOfBlessing,
    ];

    /// Table name, identical to the backend collection name.
    pub fn name(self) -> &'static str {
        match self {
            DictionaryTable::Elements => "elements",
            DictionaryTable::Specials => "specials",
            DictionaryTable::CharacterRoles => "characterRoles",
            DictionaryTable::WeaponTypes => "weaponTypes",
            DictionaryTable::Weapons => "weapons",
            DictionaryTable::Characters => "characters",
            DictionaryTable::ArtifactSets => "artifactSets",
            DictionaryTable::ArtifactTypes => "artifactTypes",
            DictionaryTable::DomainsOfBlessing => "domainsOfBlessing",
        }
    }
}

impl fmt::Display for DictionaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DictionaryTable {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DictionaryTable::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| CacheError::UnknownTable(s.to_string()))
    }
}

// ============================================================================
// ReferenceStore
// ============================================================================

/// Storage contract for the reference cache.
///
/// Implementations must be safe to share between the worker task and
/// readers. A reader never observes a table half-way through
/// [`ReferenceStore::replace_all`].
pub trait ReferenceStore: Send + Sync {
    fn get(&self, table: DictionaryTable, id: &str) -> Result<Option<Value>, CacheError>;

    /// One slot per requested id, in request order; misses are `None`.
    fn bulk_get(
        &self,
        table: DictionaryTable,
        ids: &[&str],
    ) -> Result<Vec<Option<Value>>, CacheError> {
        ids.iter().map(|id| self.get(table, id)).collect()
    }

    /// Every record of `table` in insertion order.
    fn get_all(&self, table: DictionaryTable) -> Result<Vec<Value>, CacheError>;

    /// Upsert by `id`.
    fn bulk_put(&self, table: DictionaryTable, records: &[Value]) -> Result<(), CacheError>;

    fn clear(&self, table: DictionaryTable) -> Result<(), CacheError>;

    /// Clear and refill every listed table as one step.
    fn replace_all(&self, snapshot: &[(DictionaryTable, Vec<Value>)]) -> Result<(), CacheError>;

    fn get_config(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set_config(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// The `id` field of a cached record.
pub(crate) fn record_id(table: DictionaryTable, record: &Value) -> Result<String, CacheError> {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CacheError::MissingId {
            table: table.name().to_string(),
        })
}
