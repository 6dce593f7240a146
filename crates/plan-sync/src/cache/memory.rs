use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::{record_id, DictionaryTable, ReferenceStore};
use crate::error::CacheError;

type Table = IndexMap<String, Value>;

/// In-memory reference cache. Tables keep insertion order.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<DictionaryTable, Table>>,
    config: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn keyed(table: DictionaryTable, records: &[Value]) -> Result<Vec<(String, Value)>, CacheError> {
    records
        .iter()
        .map(|r| Ok((record_id(table, r)?, r.clone())))
        .collect()
}

impl ReferenceStore for MemoryStore {
    fn get(&self, table: DictionaryTable, id: &str) -> Result<Option<Value>, CacheError> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .and_then(|t| t.get(id))
            .cloned())
    }

    fn get_all(&self, table: DictionaryTable) -> Result<Vec<Value>, CacheError> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    fn bulk_put(&self, table: DictionaryTable, records: &[Value]) -> Result<(), CacheError> {
        let rows = keyed(table, records)?;
        self.tables.write().entry(table).or_default().extend(rows);
        Ok(())
    }

    fn clear(&self, table: DictionaryTable) -> Result<(), CacheError> {
        self.tables.write().remove(&table);
        Ok(())
    }

    fn replace_all(&self, snapshot: &[(DictionaryTable, Vec<Value>)]) -> Result<(), CacheError> {
        // Validate everything before taking the write lock so a bad record
        // leaves the cache untouched.
        let mut fresh = Vec::with_capacity(snapshot.len());
        for (table, records) in snapshot {
            fresh.push((*table, keyed(*table, records)?.into_iter().collect::<Table>()));
        }
        let mut tables = self.tables.write();
        for (table, rows) in fresh {
            tables.insert(table, rows);
        }
        Ok(())
    }

    fn get_config(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.config.read().get(key).cloned())
    }

    fn set_config(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.config.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
