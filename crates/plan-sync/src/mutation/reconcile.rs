//! Merge batch results back into a committed collection.
//!
//! Results are positional. For a batch with `U` updates, `C` creates and `D`
//! deletes, `results[0..U)` answer the updates, `results[U..U+C)` the creates
//! and the rest the deletes, matching [`Staged::to_requests`].
//!
//! [`Staged::to_requests`]: super::state::Staged::to_requests

use serde_json::Value;
use thiserror::Error;

use super::state::{SortHook, Staged};
use crate::remote::BatchResponse;
use crate::types::SyncRecord;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{collection}: batch returned {got} results, expected at least {expected}")]
    MissingResult {
        collection: String,
        expected: usize,
        got: usize,
    },

    #[error("{collection}: could not find record {id} it is intended to update")]
    RecordNotFound { collection: String, id: String },

    #[error("{collection}: could not find the plan it is intended to update")]
    ScopeNotFound { collection: String },

    #[error("{collection}: failed to decode server record: {source}")]
    Decode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Apply `results` of the finished batch `done` to `target`.
///
/// Updates merge the returned fields into the existing record, so fields the
/// server omitted survive. Creates append the server record. Deletes remove
/// by id. On error `target` may be partially modified; callers apply this to
/// a draft and discard it on failure.
pub fn reconcile<T: SyncRecord>(
    collection: &str,
    done: &Staged<T>,
    results: &[BatchResponse],
    target: &mut Vec<T>,
    sort: Option<&SortHook<T>>,
) -> Result<(), ReconcileError> {
    let updates = done.to_update.len();
    let creates = done.to_create.len();
    if results.len() < updates + creates {
        return Err(ReconcileError::MissingResult {
            collection: collection.to_string(),
            expected: updates + creates,
            got: results.len(),
        });
    }
    let decode_err = |source| ReconcileError::Decode {
        collection: collection.to_string(),
        source,
    };

    for (id, result) in done.to_update.keys().zip(&results[..updates]) {
        let slot = target
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| ReconcileError::RecordNotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;
        let mut merged = serde_json::to_value(&*slot).map_err(decode_err)?;
        merge_fields(&mut merged, &result.body);
        *slot = serde_json::from_value(merged).map_err(decode_err)?;
    }

    for result in &results[updates..updates + creates] {
        target.push(serde_json::from_value(result.body.clone()).map_err(decode_err)?);
    }

    if !done.to_delete.is_empty() {
        target.retain(|r| !done.to_delete.contains(r.id()));
    }

    if let Some(sort) = sort {
        target.sort_by(|a, b| sort(a, b));
    }
    Ok(())
}

/// Shallow merge: every top-level field of `patch` overwrites `base`.
fn merge_fields(base: &mut Value, patch: &Value) {
    if let (Value::Object(base), Value::Object(patch)) = (base, patch) {
        for (key, value) in patch {
            base.insert(key.clone(), value.clone());
        }
    }
}
