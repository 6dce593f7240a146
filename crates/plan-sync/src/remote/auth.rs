//! Auth session store.
//!
//! Holds the current token and user record, persists them as JSON under a
//! fixed key in a session file, and publishes sign-in / sign-out events.
//! Logging out clears the session; subscribers (e.g. the pending plan queue)
//! drop their per-user state in response.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::emitter::{EventEmitter, Subscription};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub record: AuthRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthRecord),
    SignedOut,
}

pub struct AuthStore {
    session: Mutex<Option<AuthSession>>,
    storage: Option<(PathBuf, String)>,
    events: EventEmitter<AuthEvent>,
}

impl AuthStore {
    /// Session kept in memory only.
    pub fn in_memory() -> Self {
        Self {
            session: Mutex::new(None),
            storage: None,
            events: EventEmitter::new(),
        }
    }

    /// Session persisted under `key` in the JSON file at `path`. An existing
    /// session is restored; an unreadable file starts signed out.
    pub fn persistent(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        let path = path.into();
        let key = key.into();
        let session = read_session(&path, &key);
        Self {
            session: Mutex::new(session),
            storage: Some((path, key)),
            events: EventEmitter::new(),
        }
    }

    /// Token present and its `exp` claim still in the future.
    pub fn is_valid(&self) -> bool {
        match self.session.lock().as_ref() {
            Some(session) => token_is_fresh(&session.token, chrono::Utc::now().timestamp()),
            None => false,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.token.clone())
    }

    pub fn record(&self) -> Option<AuthRecord> {
        self.session.lock().as_ref().map(|s| s.record.clone())
    }

    pub fn save(&self, session: AuthSession) {
        let record = session.record.clone();
        *self.session.lock() = Some(session.clone());
        self.persist(Some(&session));
        self.events.emit(&AuthEvent::SignedIn(record));
    }

    /// Sign out. Subscribers receive [`AuthEvent::SignedOut`].
    pub fn clear(&self) {
        let had_session = self.session.lock().take().is_some();
        self.persist(None);
        if had_session {
            self.events.emit(&AuthEvent::SignedOut);
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&AuthEvent) + Send + Sync + 'static) -> Subscription {
        self.events.subscribe(callback)
    }

    fn persist(&self, session: Option<&AuthSession>) {
        let Some((path, key)) = &self.storage else {
            return;
        };
        let mut entries: HashMap<String, Value> = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        match session.map(serde_json::to_value) {
            Some(Ok(value)) => {
                entries.insert(key.clone(), value);
            }
            Some(Err(e)) => {
                warn!(error = %e, "failed to serialize auth session");
                return;
            }
            None => {
                entries.remove(key);
            }
        }
        let written = serde_json::to_string_pretty(&entries)
            .map_err(std::io::Error::other)
            .and_then(|raw| fs::write(path, raw));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "failed to persist auth session");
        }
    }
}

fn read_session(path: &Path, key: &str) -> Option<AuthSession> {
    let raw = fs::read_to_string(path).ok()?;
    let mut entries: HashMap<String, Value> = serde_json::from_str(&raw).ok()?;
    serde_json::from_value(entries.remove(key)?).ok()
}

/// Decode the JWT payload and compare its `exp` claim with `now`.
fn token_is_fresh(token: &str, now: i64) -> bool {
    let Some(payload) = token.split('.').nth(1) else {
        return false;
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return false;
    };
    let Ok(claims) = serde_json::from_slice::<Value>(&bytes) else {
        return false;
    };
    claims
        .get("exp")
        .and_then(Value::as_i64)
        .is_some_and(|exp| exp > now)
}

#[cfg(test)]
pub(crate) fn test_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"id":"u1","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}
