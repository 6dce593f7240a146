//! Optimistic, batched synchronization core for a character build planner.
//!
//! The crate keeps three kinds of state in step with a PocketBase-style
//! backend:
//!
//! - **Dictionaries**: versioned reference data mirrored into a local
//!   [`cache::ReferenceStore`] by the [`dictionary`] worker.
//! - **Plans**: the user's builds, held in a shared copy-on-write
//!   [`plans::PlansCache`] and edited through [`mutation`] engines that
//!   apply intents optimistically and flush them as debounced batches.
//! - **New plans**: created one by one through the [`pending`] queue.
//!
//! Per-plan sync flags from every engine are aggregated in the
//! [`registry`]. [`context::PlannerContext`] wires everything together.

pub mod cache;
pub mod config;
pub mod context;
pub mod dictionary;
pub mod emitter;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod notify;
pub mod patch;
pub mod pending;
pub mod plans;
pub mod registry;
pub mod remote;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use context::{PlannerContext, PlannerContextBuilder};
pub use error::{PlanSyncError, RemoteError, Result, ValidationError};
pub use mutation::{CollectionMutationEngine, EngineOptions, EngineServices, Intent};
pub use notify::{Notification, Notifier};
pub use pending::{PendingPlan, PendingPlanQueue, PendingState};
pub use plans::PlansCache;
pub use registry::{PendingStatusRegistry, PlanStatus};
pub use remote::{AuthStore, RemoteClient};
pub use types::{Optimistic, Plan, SyncRecord};
