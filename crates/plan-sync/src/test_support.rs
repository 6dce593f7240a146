//! Shared doubles for unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::RemoteError;
use crate::mutation::EngineServices;
use crate::notify::CollectingNotifier;
use crate::plans::PlansCache;
use crate::registry::PendingStatusRegistry;
use crate::remote::{BatchRequest, BatchResponse, ListOptions, RemoteClient};
use crate::types::Plan;

type BatchResponder =
    Box<dyn Fn(&[BatchRequest]) -> Result<Vec<BatchResponse>, RemoteError> + Send + Sync>;
type CreateResponder = Box<dyn Fn(&str, &Value) -> Result<Value, RemoteError> + Send + Sync>;

/// Records every write. Echoes writes back unless a responder is set.
#[derive(Default)]
pub struct MockRemote {
    batches: Mutex<Vec<Vec<BatchRequest>>>,
    creates: Mutex<Vec<(String, Value)>>,
    batch_responder: Mutex<Option<BatchResponder>>,
    create_responder: Mutex<Option<CreateResponder>>,
    pub delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_batch(
        &self,
        f: impl Fn(&[BatchRequest]) -> Result<Vec<BatchResponse>, RemoteError>
            + Send
            + Sync
            + 'static,
    ) {
        *self.batch_responder.lock() = Some(Box::new(f));
    }

    pub fn on_create(
        &self,
        f: impl Fn(&str, &Value) -> Result<Value, RemoteError> + Send + Sync + 'static,
    ) {
        *self.create_responder.lock() = Some(Box::new(f));
    }

    pub fn batches(&self) -> Vec<Vec<BatchRequest>> {
        self.batches.lock().clone()
    }

    pub fn creates(&self) -> Vec<(String, Value)> {
        self.creates.lock().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Server-side view of a batch: updates echo, creates get `srv{i}` ids.
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
    async fn get_full_list(&self, _: &str, _: &ListOptions) -> Result<Vec<Value>, RemoteError> {
        Ok(Vec::new())
    }

    async fn get_one(&self, _: &str, _: &str) -> Result<Value, RemoteError> {
        Err(RemoteError::new(404, "The requested resource wasn't found."))
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<Value, RemoteError> {
        let n = {
            let mut creates = self.creates.lock();
            creates.push((collection.to_string(), body.clone()));
            creates.len()
        };
        self.pause().await;
        match self.create_responder.lock().as_ref() {
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
        self.batches.lock().push(requests.to_vec());
        self.pause().await;
        match self.batch_responder.lock().as_ref() {
            Some(f) => f(requests),
            None => Ok(echo(requests)),
        }
    }

    async fn send(&self, _: &str, _: Option<&Value>) -> Result<Value, RemoteError> {
        Ok(Value::Null)
    }
}

/// Collaborators around a single plan `p1` owned by `u1`.
pub struct Fixture {
    pub remote: Arc<MockRemote>,
    pub plans: Arc<PlansCache>,
    pub registry: Arc<PendingStatusRegistry>,
    pub notifier: Arc<CollectingNotifier>,
}

impl Fixture {
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

pub fn services() -> EngineServices {
    Fixture::new(vec![Plan::new("p1", "u1", "xiao", 1)]).services()
}
