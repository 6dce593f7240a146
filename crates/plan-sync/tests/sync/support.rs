//! Scripted backend and collaborators shared by the sync tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::Mutex;
use plan_sync::mutation::EngineServices;
use plan_sync::notify::CollectingNotifier;
use plan_sync::plans::PlansCache;
use plan_sync::registry::PendingStatusRegistry;
use plan_sync::remote::{
    AuthRecord, AuthSession, AuthStore, BatchRequest, BatchResponse, ListOptions, RemoteClient,
};
use plan_sync::types::{Plan, WeaponPlan};
use plan_sync::RemoteError;
use serde_json::{json, Value};

// ============================================================================
// MockRemote
// ============================================================================

pub struct MockRemote {
    inner: Mutex<MockRemoteInner>,
}

#[allow(clippy::type_complexity)]
struct MockRemoteInner {
    batches: Vec<Vec<BatchRequest>>,
    creates: Vec<(String, Value)>,
    list_calls: Vec<String>,
    lists: HashMap<String, Vec<Value>>,
    failing_lists: Vec<String>,
    version: Value,
    delay: Option<Duration>,
    batch_response: Option<
        Box<dyn Fn(&[BatchRequest]) -> Result<Vec<BatchResponse>, RemoteError> + Send + Sync>,
    >,
    create_response:
        Option<Box<dyn Fn(&str, &Value) -> Result<Value, RemoteError> + Send + Sync>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockRemoteInner {
                batches: Vec::new(),
                creates: Vec::new(),
                list_calls: Vec::new(),
                lists: HashMap::new(),
                failing_lists: Vec::new(),
                version: json!("v1"),
                delay: None,
                batch_response: None,
                create_response: None,
            }),
        })
    }

    pub fn on_batch(
        &self,
        f: impl Fn(&[BatchRequest]) -> Result<Vec<BatchResponse>, RemoteError>
            + Send
            + Sync
            + 'static,
    ) {
        self.inner.lock().batch_response = Some(Box::new(f));
    }

    pub fn on_create(
        &self,
        f: impl Fn(&str, &Value) -> Result<Value, RemoteError> + Send + Sync + 'static,
    ) {
        self.inner.lock().create_response = Some(Box::new(f));
    }

    pub fn set_list(&self, collection: &str, records: Vec<Value>) {
        self.inner
            .lock()
            .lists
            .insert(collection.to_string(), records);
    }

    pub fn fail_list(&self, collection: &str) {
        self.inner.lock().failing_lists.push(collection.to_string());
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failing_lists.clear();
    }

    pub fn set_version(&self, version: &str) {
        self.inner.lock().version = json!(version);
    }

    /// Hold every list and write for `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.inner.lock().delay = delay;
    }

    pub fn batches(&self) -> Vec<Vec<BatchRequest>> {
        self.inner.lock().batches.clone()
    }

    pub fn creates(&self) -> Vec<(String, Value)> {
        self.inner.lock().creates.clone()
    }

    pub fn list_calls(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .list_calls
            .iter()
            .filter(|c| *c == collection)
            .count()
    }

    async fn pause(&self) {
        let delay = self.inner.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Server view of a batch: updates echo, creates get `srv{i}` ids.
pub fn echo(requests: &[BatchRequest]) -> Vec<BatchResponse> {
    requests
        .iter()
        .enumerate()
        .map(|(i, r)| match r {
            BatchRequest::Update { body, .. } => BatchResponse {
                status: 200,
                body: body.clone(),
            },
            BatchRequest::Create { body, .. } => {
                let mut body = body.clone();
                body["id"] = json!(format!("srv{i}"));
                BatchResponse { status: 200, body }
            }
            BatchRequest::Delete { .. } => BatchResponse {
                status: 204,
                body: Value::Null,
            },
        })
        .collect()
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn get_full_list(
        &self,
        collection: &str,
        _: &ListOptions,
    ) -> Result<Vec<Value>, RemoteError> {
        self.inner.lock().list_calls.push(collection.to_string());
        self.pause().await;
        let inner = self.inner.lock();
        if inner.failing_lists.iter().any(|c| c == collection) {
            return Err(RemoteError::new(500, "Something went wrong."));
        }
        Ok(inner.lists.get(collection).cloned().unwrap_or_default())
    }

    async fn get_one(&self, _: &str, _: &str) -> Result<Value, RemoteError> {
        Err(RemoteError::new(404, "The requested resource wasn't found."))
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<Value, RemoteError> {
        let n = {
            let mut inner = self.inner.lock();
            inner.creates.push((collection.to_string(), body.clone()));
            inner.creates.len()
        };
        self.pause().await;
        let inner = self.inner.lock();
        match inner.create_response.as_ref() {
            Some(f) => f(collection, body),
            None => {
                let mut body = body.clone();
                body["id"] = json!(format!("srv{n}"));
                Ok(body)
            }
        }
    }

    async fn update(&self, _: &str, _: &str, body: &Value) -> Result<Value, RemoteError> {
        Ok(body.clone())
    }

    async fn delete(&self, _: &str, _: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn send_batch(
        &self,
        requests: &[BatchRequest],
    ) -> Result<Vec<BatchResponse>, RemoteError> {
        self.inner.lock().batches.push(requests.to_vec());
        self.pause().await;
        let inner = self.inner.lock();
        match inner.batch_response.as_ref() {
            Some(f) => f(requests),
            None => Ok(echo(requests)),
        }
    }

    async fn send(&self, _: &str, _: Option<&Value>) -> Result<Value, RemoteError> {
        Ok(self.inner.lock().version.clone())
    }
}

// ============================================================================
// Collaborators
// ============================================================================

pub struct Harness {
    pub remote: Arc<MockRemote>,
    pub plans: Arc<PlansCache>,
    pub registry: Arc<PendingStatusRegistry>,
    pub notifier: Arc<CollectingNotifier>,
}

impl Harness {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self {
            remote: MockRemote::new(),
            plans: Arc::new(PlansCache::with_plans(plans)),
            registry: Arc::new(PendingStatusRegistry::new()),
            notifier: Arc::new(CollectingNotifier::new()),
        }
    }

    pub fn services(&self) -> EngineServices {
        EngineServices {
            remote: self.remote.clone(),
            plans: self.plans.clone(),
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

pub fn plan(id: &str, order: i64) -> Plan {
    Plan::new(id, "u1", format!("char-{id}"), order)
}

pub fn weapon(id: &str, weapon: &str, order: i64) -> WeaponPlan {
    WeaponPlan {
        id: id.into(),
        character_plan: "p1".into(),
        weapon: weapon.into(),
        level_current: 1,
        level_target: 90,
        refinement_current: 1,
        refinement_target: 5,
        order,
        tag: None,
        created: None,
        updated: None,
    }
}

/// Plan `p1` holding `weapons`.
pub fn plan_with_weapons(weapons: Vec<WeaponPlan>) -> Plan {
    let mut p = plan("p1", 1);
    p.weapon_plans = weapons;
    p
}

/// A JWT-shaped token whose `exp` lies an hour ahead.
pub fn fresh_token() -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"id":"u1","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

pub fn signed_in() -> Arc<AuthStore> {
    let auth = Arc::new(AuthStore::in_memory());
    auth.save(AuthSession {
        token: fresh_token(),
        record: AuthRecord {
            id: "u1".into(),
            email: "traveler@example.com".into(),
            name: None,
            avatar: None,
            verified: true,
        },
    });
    auth
}

/// Let debounce timers fire and spawned requests settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(2)).await;
}
