use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plan_sync::cache::{
    DictionaryIndex, DictionaryTable, MemoryStore, ReferenceStore, DICTIONARY_VERSION_KEY,
};
use plan_sync::dictionary::{
    forward_errors, DictionaryLoader, DictionaryWorker, LoadOutcome, WorkerEvent, WorkerState,
    LOAD_ERROR_MESSAGE,
};
use plan_sync::error::CacheError;
use plan_sync::notify::{CollectingNotifier, Notification};
use serde_json::{json, Value};

use super::support::MockRemote;

/// Memory store that counts full replacements.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    replaced: AtomicUsize,
}

impl CountingStore {
    fn replaced(&self) -> usize {
        self.replaced.load(Ordering::SeqCst)
    }
}

impl ReferenceStore for CountingStore {
    fn get(&self, table: DictionaryTable, id: &str) -> Result<Option<Value>, CacheError> {
        self.inner.get(table, id)
    }

    fn get_all(&self, table: DictionaryTable) -> Result<Vec<Value>, CacheError> {
        self.inner.get_all(table)
    }

    fn bulk_put(&self, table: DictionaryTable, records: &[Value]) -> Result<(), CacheError> {
        self.inner.bulk_put(table, records)
    }

    fn clear(&self, table: DictionaryTable) -> Result<(), CacheError> {
        self.inner.clear(table)
    }

    fn replace_all(&self, snapshot: &[(DictionaryTable, Vec<Value>)]) -> Result<(), CacheError> {
        self.replaced.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_all(snapshot)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get_config(key)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.inner.set_config(key, value)
    }
}

fn character(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "icon": format!("{id}.png"),
        "element": "anemo",
        "weaponType": "polearm",
        "special": "atk",
        "rarity": 5
    })
}

fn backend() -> Arc<MockRemote> {
    let remote = MockRemote::new();
    remote.set_version("v1");
    remote.set_list("characters", vec![character("xiao", "Xiao")]);
    remote.set_list(
        "elements",
        vec![json!({ "id": "anemo", "name": "Anemo", "color": "#74c2a8", "icon": "anemo.png" })],
    );
    remote
}

fn silent() -> impl FnMut(WorkerEvent) + Send {
    |_: WorkerEvent| {}
}

// ============================================================================
// Loader
// ============================================================================

#[tokio::test]
async fn unchanged_version_skips_the_refresh() {
    let remote = backend();
    let store = Arc::new(CountingStore::default());
    let loader = DictionaryLoader::new(remote.clone(), store.clone());

    let first = loader.load(false, &mut silent()).await.unwrap();
    assert_eq!(first, LoadOutcome::Refreshed { version: "v1".into() });
    let second = loader.load(false, &mut silent()).await.unwrap();
    assert_eq!(second, LoadOutcome::UpToDate { version: "v1".into() });

    assert_eq!(store.replaced(), 1);
    assert_eq!(remote.list_calls("characters"), 1);
    assert_eq!(
        store.get_config(DICTIONARY_VERSION_KEY).unwrap().as_deref(),
        Some("v1")
    );
}

#[tokio::test]
async fn forced_reload_always_replaces() {
    let remote = backend();
    let store = Arc::new(CountingStore::default());
    let loader = DictionaryLoader::new(remote.clone(), store.clone());

    loader.load(false, &mut silent()).await.unwrap();
    remote.set_list("characters", vec![character("xiao", "Xiao"), character("hutao", "Hu Tao")]);
    loader.load(true, &mut silent()).await.unwrap();

    assert_eq!(store.replaced(), 2);
    assert_eq!(store.get_all(DictionaryTable::Characters).unwrap().len(), 2);
}

#[tokio::test]
async fn new_version_replaces_stale_rows() {
    let remote = backend();
    let store = Arc::new(CountingStore::default());
    let loader = DictionaryLoader::new(remote.clone(), store.clone());

    loader.load(false, &mut silent()).await.unwrap();
    remote.set_version("v2");
    remote.set_list("characters", vec![character("hutao", "Hu Tao")]);
    let outcome = loader.load(false, &mut silent()).await.unwrap();

    assert_eq!(outcome, LoadOutcome::Refreshed { version: "v2".into() });
    let ids: Vec<Value> = store
        .get_all(DictionaryTable::Characters)
        .unwrap()
        .into_iter()
        .map(|c| c["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("hutao")]);
}

#[tokio::test]
async fn failed_fetch_leaves_the_cache_alone() {
    let remote = backend();
    let store = Arc::new(CountingStore::default());
    let loader = DictionaryLoader::new(remote.clone(), store.clone());
    loader.load(false, &mut silent()).await.unwrap();

    remote.set_version("v2");
    remote.fail_list("weapons");
    assert!(loader.load(false, &mut silent()).await.is_err());

    assert_eq!(store.replaced(), 1);
    assert_eq!(
        store.get_config(DICTIONARY_VERSION_KEY).unwrap().as_deref(),
        Some("v1")
    );
    assert_eq!(store.get_all(DictionaryTable::Characters).unwrap().len(), 1);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn refresh_writes_through_to_sqlite() {
    use plan_sync::cache::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dictionaries.db");
    let remote = backend();
    let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());
    let loader = DictionaryLoader::new(remote, store.clone());

    let outcome = loader.load(false, &mut silent()).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Refreshed { version: "v1".into() });
    let reopened = SqliteStore::open(path.to_str().unwrap()).unwrap();
    assert_eq!(reopened.get_all(DictionaryTable::Characters).unwrap().len(), 1);
    assert_eq!(
        reopened.get_config(DICTIONARY_VERSION_KEY).unwrap().as_deref(),
        Some("v1")
    );
    let again = loader.load(false, &mut silent()).await.unwrap();
    assert_eq!(again, LoadOutcome::UpToDate { version: "v1".into() });
}

#[tokio::test]
async fn refresh_reports_progress_in_order() {
    let remote = backend();
    let store = Arc::new(MemoryStore::new());
    let loader = DictionaryLoader::new(remote, store);

    let mut messages = Vec::new();
    loader
        .load(false, &mut |event: WorkerEvent| messages.push(event.message().to_string()))
        .await
        .unwrap();

    assert_eq!(
        messages,
        vec![
            "Cleared old cache",
            "Fetched collections",
            "Stored to local cache",
            "Data loaded"
        ]
    );
}

// ============================================================================
// Worker
// ============================================================================

#[tokio::test(start_paused = true)]
async fn worker_loads_on_start_and_reloads_on_request() {
    let remote = backend();
    let store = Arc::new(CountingStore::default());
    let (handle, events) =
        DictionaryWorker::spawn(DictionaryLoader::new(remote.clone(), store.clone()));
    let notifier = Arc::new(CollectingNotifier::new());
    let _forward = forward_errors(&handle, events, notifier.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.state(), WorkerState::Idle);
    assert_eq!(store.replaced(), 1);

    handle.load();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.replaced(), 1);

    handle.post_message(r#"{"action":"reloadDictionaries"}"#).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.replaced(), 2);
    assert!(notifier.is_empty());

    let index = DictionaryIndex::load(store.as_ref()).unwrap();
    assert_eq!(index.character("xiao").map(|c| c.name.as_str()), Some("Xiao"));
    assert_eq!(index.element("anemo").map(|e| e.color.as_str()), Some("#74c2a8"));
}

#[tokio::test(start_paused = true)]
async fn worker_failure_becomes_a_persistent_notice() {
    let remote = backend();
    remote.fail_list("artifactSets");
    let store = Arc::new(CountingStore::default());
    let (handle, events) =
        DictionaryWorker::spawn(DictionaryLoader::new(remote.clone(), store.clone()));
    let notifier = Arc::new(CollectingNotifier::new());
    let _forward = forward_errors(&handle, events, notifier.clone());

    let state = handle.wait_for(|s| s == WorkerState::Error).await;
    assert_eq!(state, WorkerState::Error);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(store.replaced(), 0);
    let notices = notifier.take();
    let reload = match notices.as_slice() {
        [notice @ Notification::DictionaryError {
            message,
            error,
            reload,
        }] => {
            assert_eq!(message, LOAD_ERROR_MESSAGE);
            assert!(error.contains("Something went wrong."));
            assert!(notice.is_persistent());
            reload.clone()
        }
        other => panic!("expected one dictionary error, got {other:?}"),
    };

    remote.clear_failures();
    reload.run();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.state(), WorkerState::Idle);
    assert_eq!(store.replaced(), 1);
    assert!(notifier.is_empty());
}

#[tokio::test(start_paused = true)]
async fn requests_during_a_load_are_dropped() {
    let remote = backend();
    remote.set_delay(Some(Duration::from_millis(500)));
    let store = Arc::new(CountingStore::default());
    let (handle, _events) =
        DictionaryWorker::spawn(DictionaryLoader::new(remote.clone(), store.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_ne!(handle.state(), WorkerState::Idle);
    handle.reload();
    handle.reload();
    handle.wait_for(|s| s == WorkerState::Idle).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(store.replaced(), 1);
    assert_eq!(remote.list_calls("characters"), 1);
    assert_eq!(handle.state(), WorkerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn unknown_messages_are_ignored() {
    let remote = backend();
    let store = Arc::new(CountingStore::default());
    let (handle, _events) =
        DictionaryWorker::spawn(DictionaryLoader::new(remote, store.clone()));
    tokio::time::sleep(Duration::from_millis(10)).await;

    handle.post_message(r#"{"action":"dropEverything"}"#).unwrap();
    assert!(handle.post_message("not json").is_err());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.replaced(), 1);
}
