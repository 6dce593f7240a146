//! Remote data client: the network seam of the sync core.
//!
//! [`RemoteClient`] is implemented by the HTTP client (feature `http`) and by
//! test doubles. Every call may suspend; cancellation is reported as a
//! [`RemoteError`] with `is_abort == true`.

pub mod auth;
#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

pub use auth::{AuthEvent, AuthRecord, AuthSession, AuthStore};
#[cfg(feature = "http")]
pub use http::HttpRemoteClient;

/// Path of the RPC that reports the current dictionary version token.
pub const DICTIONARY_VERSION_PATH: &str = "/api/dictionaryVersion";

// ============================================================================
// RemoteClient
// ============================================================================

#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch every record of a collection (all pages).
    async fn get_full_list(
        &self,
        collection: &str,
        opts: &ListOptions,
    ) -> Result<Vec<Value>, RemoteError>;

    async fn get_one(&self, collection: &str, id: &str) -> Result<Value, RemoteError>;

    /// Create a record; returns the server-materialized record.
    async fn create(&self, collection: &str, body: &Value) -> Result<Value, RemoteError>;

    /// Update a record; returns the server-materialized record.
    async fn update(&self, collection: &str, id: &str, body: &Value)
        -> Result<Value, RemoteError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// Send several writes as one transactional request. Results are in
    /// request order.
    async fn send_batch(&self, requests: &[BatchRequest])
        -> Result<Vec<BatchResponse>, RemoteError>;

    /// Arbitrary RPC against `path`.
    async fn send(&self, path: &str, body: Option<&Value>) -> Result<Value, RemoteError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub fields: Option<String>,
}

impl ListOptions {
    pub fn sorted(sort: impl Into<String>) -> Self {
        Self {
            sort: Some(sort.into()),
            ..Self::default()
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum BatchRequest {
    Create {
        collection: String,
        body: Value,
    },
    Update {
        collection: String,
        id: String,
        body: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchRequest {
    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }
}

/// One entry of a batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

/// Builder collecting writes for [`RemoteClient::send_batch`].
///
/// ```ignore
/// let mut batch = Batch::new();
/// batch.collection("weaponPlans").update("w1", json!({ "levelTarget": 80 }));
/// batch.collection("weaponPlans").delete("w2");
/// let results = batch.send(&client).await?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct Batch {
    requests: Vec<BatchRequest>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection<'a>(&'a mut self, name: &str) -> BatchCollection<'a> {
        BatchCollection {
            batch: self,
            name: name.to_string(),
        }
    }

    pub fn requests(&self) -> &[BatchRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub async fn send(&self, client: &dyn RemoteClient) -> Result<Vec<BatchResponse>, RemoteError> {
        client.send_batch(&self.requests).await
    }
}

pub struct BatchCollection<'a> {
    batch: &'a mut Batch,
    name: String,
}

impl BatchCollection<'_> {
    pub fn create(self, body: Value) {
        self.batch.requests.push(BatchRequest::Create {
            collection: self.name,
            body,
        });
    }

    pub fn update(self, id: impl Into<String>, body: Value) {
        self.batch.requests.push(BatchRequest::Update {
            collection: self.name,
            id: id.into(),
            body,
        });
    }

    pub fn delete(self, id: impl Into<String>) {
        self.batch.requests.push(BatchRequest::Delete {
            collection: self.name,
            id: id.into(),
        });
    }
}
