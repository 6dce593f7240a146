use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info};

use super::WorkerEvent;
use crate::cache::{DictionaryTable, ReferenceStore, DICTIONARY_VERSION_KEY};
use crate::error::{CacheError, Result};
use crate::remote::{ListOptions, RemoteClient, DICTIONARY_VERSION_PATH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub remote: String,
    pub local: Option<String>,
}

impl VersionCheck {
    pub fn is_current(&self) -> bool {
        self.local.as_deref() == Some(self.remote.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    UpToDate { version: String },
    Refreshed { version: String },
}

/// Version check plus full refresh of the reference cache.
#[derive(Clone)]
pub struct DictionaryLoader {
    remote: Arc<dyn RemoteClient>,
    store: Arc<dyn ReferenceStore>,
}

impl DictionaryLoader {
    pub fn new(remote: Arc<dyn RemoteClient>, store: Arc<dyn ReferenceStore>) -> Self {
        Self { remote, store }
    }

    pub fn store(&self) -> &Arc<dyn ReferenceStore> {
        &self.store
    }

    pub async fn check_version(&self) -> Result<VersionCheck> {
        let remote = version_token(self.remote.send(DICTIONARY_VERSION_PATH, None).await?);
        let local = self
            .with_store(|store| store.get_config(DICTIONARY_VERSION_KEY))
            .await?;
        Ok(VersionCheck { remote, local })
    }

    /// Fetch every table, then replace the cache and store `version`.
    ///
    /// Nothing is written unless every fetch succeeded; the version token is
    /// stored only after the tables.
    pub async fn refresh(
        &self,
        version: &str,
        emit: &mut (dyn FnMut(WorkerEvent) + Send),
    ) -> Result<()> {
        emit(WorkerEvent::status("Cleared old cache"));

        let opts = ListOptions::default();
        let fetched = try_join_all(
            DictionaryTable::ALL
                .iter()
                .map(|table| self.remote.get_full_list(table.name(), &opts)),
        )
        .await?;
        emit(WorkerEvent::status("Fetched collections"));

        let snapshot: Vec<(DictionaryTable, Vec<Value>)> =
            DictionaryTable::ALL.into_iter().zip(fetched).collect();
        for (table, records) in &snapshot {
            debug!(table = %table, count = records.len(), "replacing dictionary table");
        }
        self.with_store(move |store| store.replace_all(&snapshot)).await?;
        emit(WorkerEvent::status("Stored to local cache"));

        let token = version.to_string();
        self.with_store(move |store| store.set_config(DICTIONARY_VERSION_KEY, &token))
            .await?;
        info!(version, "dictionaries refreshed");
        emit(WorkerEvent::Status {
            message: "Data loaded".to_string(),
            version: Some(version.to_string()),
        });
        Ok(())
    }

    /// Run `f` against the store on the blocking pool. Store backends do
    /// synchronous disk I/O.
    async fn with_store<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn ReferenceStore) -> Result<R, CacheError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let out = tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))??;
        Ok(out)
    }

    /// Probe the version and refresh when it changed or `force` is set.
    pub async fn load(
        &self,
        force: bool,
        emit: &mut (dyn FnMut(WorkerEvent) + Send),
    ) -> Result<LoadOutcome> {
        let check = self.check_version().await?;
        if !force && check.is_current() {
            emit(WorkerEvent::status("No dictionary update required"));
            return Ok(LoadOutcome::UpToDate {
                version: check.remote,
            });
        }
        self.refresh(&check.remote, emit).await?;
        Ok(LoadOutcome::Refreshed {
            version: check.remote,
        })
    }
}

/// The version RPC answers with a bare JSON string; anything else is
/// compared by its JSON text.
fn version_token(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
