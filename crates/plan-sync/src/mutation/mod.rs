//! Optimistic, debounced, batched mutations of one collection.
//!
//! [`state`] is the synchronous state machine, [`reconcile`] merges batch
//! results into committed records and [`engine`] drives both on a timer.

pub mod engine;
pub mod reconcile;
pub mod state;

pub use engine::{
    AllPlans, CollectionAccess, CollectionMutationEngine, EngineOptions, EngineServices,
    EngineStatus, PlanSlot, DEFAULT_DEBOUNCE, LEAVE_PROMPT,
};
pub use reconcile::{reconcile, ReconcileError};
pub use state::{
    diff_record, Batch, BatchState, Intent, MutationState, SortHook, Staged, StagedUpdate,
    CREATE_STRIPPED_FIELDS,
};
