//! PocketBase-compatible REST client.
//!
//! Requests are independent: nothing here cancels an earlier request when a
//! later one with the same target is issued. Cancellation is the caller's
//! business (drop the future or abort its task).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};
use url::Url;

use super::auth::{AuthRecord, AuthSession, AuthStore};
use super::{BatchRequest, BatchResponse, ListOptions, RemoteClient};
use crate::error::RemoteError;

const PAGE_SIZE: usize = 500;
const USERS_COLLECTION: &str = "users";

#[derive(Clone)]
pub struct HttpRemoteClient {
    http: reqwest::Client,
    base: Url,
    auth: Arc<AuthStore>,
}

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<Value>,
}

impl HttpRemoteClient {
    pub fn new(
        base_url: &str,
        auth: Arc<AuthStore>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        // A trailing slash keeps any path prefix of the base when joining.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base = Url::parse(&normalized)
            .map_err(|e| RemoteError::new(0, format!("Invalid backend URL {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::new(0, e.to_string()))?;
        Ok(Self { http, base, auth })
    }

    pub fn auth_store(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    // ------------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------------

    /// Sign in with email/username and password; the session is saved to the
    /// auth store.
    #[instrument(skip(self, password))]
    pub async fn auth_with_password(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<AuthRecord, RemoteError> {
        let path = format!("/api/collections/{USERS_COLLECTION}/auth-with-password");
        let body = json!({ "identity": identity, "password": password });
        let response = self.execute(Method::POST, &path, &[], Some(&body)).await?;
        self.store_session(response)
    }

    /// Exchange the current token for a fresh one.
    pub async fn auth_refresh(&self) -> Result<AuthRecord, RemoteError> {
        let path = format!("/api/collections/{USERS_COLLECTION}/auth-refresh");
        let response = self.execute(Method::POST, &path, &[], None).await?;
        self.store_session(response)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), RemoteError> {
        let path = format!("/api/collections/{USERS_COLLECTION}/request-password-reset");
        self.execute(Method::POST, &path, &[], Some(&json!({ "email": email })))
            .await
            .map(|_| ())
    }

    pub async fn request_verification(&self, email: &str) -> Result<(), RemoteError> {
        let path = format!("/api/collections/{USERS_COLLECTION}/request-verification");
        self.execute(Method::POST, &path, &[], Some(&json!({ "email": email })))
            .await
            .map(|_| ())
    }

    /// Create a user account. Does not sign in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<Value, RemoteError> {
        let mut body = json!({
            "email": email,
            "password": password,
            "passwordConfirm": password,
        });
        if let Some(name) = name {
            body["name"] = Value::String(name.to_string());
        }
        self.create(USERS_COLLECTION, &body).await
    }

    pub fn logout(&self) {
        self.auth.clear();
    }

    fn store_session(&self, response: Value) -> Result<AuthRecord, RemoteError> {
        let session: AuthSession = serde_json::from_value(response.clone()).map_err(|e| {
            RemoteError::new(0, format!("Malformed auth response: {e}")).with_data(response)
        })?;
        let record = session.record.clone();
        self.auth.save(session);
        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    fn records_path(collection: &str) -> String {
        format!("/api/collections/{collection}/records")
    }

    fn record_path(collection: &str, id: &str) -> String {
        format!("/api/collections/{collection}/records/{id}")
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| RemoteError::new(0, format!("Invalid request path {path}: {e}")))?;
        let mut builder = self.http.request(method, url);
        if let Some(token) = self.auth.token() {
            builder = builder.header(reqwest::header::AUTHORIZATION, token);
        }
        Ok(builder)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        let mut builder = self.request(method.clone(), path)?;
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(%method, path, "remote request");
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        let payload: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        if status.is_success() {
            return Ok(payload);
        }

        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        Err(RemoteError::new(status.as_u16(), message).with_data(payload))
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
    RemoteError::new(status, format!("Something went wrong while processing your request: {e}"))
}

fn batch_entry(request: &BatchRequest) -> Value {
    match request {
        BatchRequest::Create { collection, body } => json!({
            "method": "POST",
            "url": HttpRemoteClient::records_path(collection),
            "body": body,
        }),
        BatchRequest::Update {
            collection,
            id,
            body,
        } => json!({
            "method": "PATCH",
            "url": HttpRemoteClient::record_path(collection, id),
            "body": body,
        }),
        BatchRequest::Delete { collection, id } => json!({
            "method": "DELETE",
            "url": HttpRemoteClient::record_path(collection, id),
        }),
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    #[instrument(skip(self, opts))]
    async fn get_full_list(
        &self,
        collection: &str,
        opts: &ListOptions,
    ) -> Result<Vec<Value>, RemoteError> {
        let path = Self::records_path(collection);
        let mut records = Vec::new();
        let mut page = 1usize;
        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("perPage", PAGE_SIZE.to_string()),
                ("skipTotal", "1".to_string()),
            ];
            if let Some(sort) = &opts.sort {
                query.push(("sort", sort.clone()));
            }
            if let Some(filter) = &opts.filter {
                query.push(("filter", filter.clone()));
            }
            if let Some(fields) = &opts.fields {
                query.push(("fields", fields.clone()));
            }

            let payload = self.execute(Method::GET, &path, &query, None).await?;
            let ListPage { items } = serde_json::from_value(payload).map_err(|e| {
                RemoteError::new(0, format!("Malformed list response: {e}"))
            })?;
            let done = items.len() < PAGE_SIZE;
            records.extend(items);
            if done {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Value, RemoteError> {
        self.execute(Method::GET, &Self::record_path(collection, id), &[], None)
            .await
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<Value, RemoteError> {
        self.execute(Method::POST, &Self::records_path(collection), &[], Some(body))
            .await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: &Value,
    ) -> Result<Value, RemoteError> {
        self.execute(
            Method::PATCH,
            &Self::record_path(collection, id),
            &[],
            Some(body),
        )
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.execute(Method::DELETE, &Self::record_path(collection, id), &[], None)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, requests), fields(count = requests.len()))]
    async fn send_batch(
        &self,
        requests: &[BatchRequest],
    ) -> Result<Vec<BatchResponse>, RemoteError> {
        let mut body = Map::new();
        body.insert(
            "requests".to_string(),
            Value::Array(requests.iter().map(batch_entry).collect()),
        );
        let payload = self
            .execute(Method::POST, "/api/batch", &[], Some(&Value::Object(body)))
            .await?;
        serde_json::from_value(payload.clone()).map_err(|e| {
            RemoteError::new(0, format!("Malformed batch response: {e}")).with_data(payload)
        })
    }

    async fn send(&self, path: &str, body: Option<&Value>) -> Result<Value, RemoteError> {
        let method = if body.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        self.execute(method, path, &[], body).await
    }
}
