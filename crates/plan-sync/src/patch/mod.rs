//! Structural patches over `serde_json::Value`.
//!
//! A patch list is an ordered sequence of `{op, path, value}` records. Lists
//! are appendable: applying `a` then `b` equals applying `a ++ b`, which is
//! what lets the mutation engine accumulate several edits of one record.

pub mod apply;
pub mod diff;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use apply::{apply_patches, apply_to};
pub use diff::diff;

pub(crate) const MAX_PATCH_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// One step of a path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    pub fn add(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    pub fn replace(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: Vec<PathSegment>) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }

    /// Shorthand for removing a top-level field.
    pub fn remove_field(field: &str) -> Self {
        Self::remove(vec![PathSegment::from(field)])
    }
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Patch path {path:?} does not exist in target")]
    PathNotFound { path: Vec<PathSegment> },

    #[error("Patch path {path:?} crosses a non-container value")]
    NotAContainer { path: Vec<PathSegment> },

    #[error("Patch {op:?} at {path:?} is missing a value")]
    MissingValue { op: PatchOp, path: Vec<PathSegment> },

    #[error("Maximum patch depth exceeded ({MAX_PATCH_DEPTH})")]
    DepthExceeded,

    #[error("Failed to convert patched record: {0}")]
    Convert(#[from] serde_json::Error),
}
