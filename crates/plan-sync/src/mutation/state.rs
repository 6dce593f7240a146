//! Pure state machine behind [`CollectionMutationEngine`].
//!
//! Two slots: `staged` collects intents as they arrive; `current` is the batch
//! handed to the network (or parked after a failure or abort). Intents never
//! touch a batch that is on the wire, except to fold into records it is not
//! yet sending.
//!
//! ```text
//!   prepare_batch          mark_dispatched         finish
//!  staged ───────► Scheduled ───────────► Pending ────────► (none)
//!                     ▲  ▲                  │ │
//!                     │  └── mark_aborted ──┘ │ mark_error
//!                     └────── retry ◄──── Error
//! ```
//!
//! [`CollectionMutationEngine`]: super::engine::CollectionMutationEngine

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::error;

use crate::patch::{apply_patches, apply_to, diff, Patch, PatchError};
use crate::remote::BatchRequest;
use crate::types::{Optimistic, SyncRecord};

/// Ordering applied to projected and reconciled collections.
pub type SortHook<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Fields the backend assigns on create.
pub const CREATE_STRIPPED_FIELDS: [&str; 3] = ["id", "created", "updated"];

// ============================================================================
// Staged intents
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpdate<T> {
    /// Record as the caller saw it when the first patch was staged.
    pub base: T,
    pub patches: Vec<Patch>,
}

impl<T: SyncRecord> StagedUpdate<T> {
    pub fn value(&self) -> Result<T, PatchError> {
        apply_to(&self.base, &self.patches)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub to_create: IndexMap<String, T>,
    pub to_update: IndexMap<String, StagedUpdate<T>>,
    pub to_delete: IndexSet<String>,
}

impl<T> Default for Staged<T> {
    fn default() -> Self {
        Self {
            to_create: IndexMap::new(),
            to_update: IndexMap::new(),
            to_delete: IndexSet::new(),
        }
    }
}

impl<T: SyncRecord> Staged<T> {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.to_create.contains_key(id)
            || self.to_update.contains_key(id)
            || self.to_delete.contains(id)
    }

    /// Ids touched by any intent.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.to_update
            .keys()
            .chain(self.to_create.keys())
            .chain(self.to_delete.iter())
            .map(String::as_str)
    }

    /// Fold `later` into `self`. A delete in `later` cancels a create in
    /// `self` outright and supersedes an update.
    fn absorb(&mut self, later: Staged<T>) -> Result<(), PatchError> {
        for (id, value) in later.to_create {
            self.to_create.entry(id).or_insert(value);
        }
        for (id, update) in later.to_update {
            if let Some(created) = self.to_create.get_mut(&id) {
                *created = apply_to(created, &update.patches)?;
            } else if let Some(existing) = self.to_update.get_mut(&id) {
                existing.patches.extend(update.patches);
            } else {
                self.to_update.insert(id, update);
            }
        }
        for id in later.to_delete {
            if self.to_create.shift_remove(&id).is_some() {
                continue;
            }
            self.to_update.shift_remove(&id);
            self.to_delete.insert(id);
        }
        Ok(())
    }

    /// Wire requests in dispatch order: updates, creates, deletes.
    ///
    /// `server_patches` are applied to every create and update body.
    pub fn to_requests(
        &self,
        collection: &str,
        server_patches: &[Patch],
    ) -> Result<Vec<BatchRequest>, PatchError> {
        let mut requests = Vec::with_capacity(self.len());
        for (id, update) in &self.to_update {
            let body = apply_patches(&serde_json::to_value(&update.base)?, &update.patches)?;
            requests.push(BatchRequest::Update {
                collection: collection.to_string(),
                id: id.clone(),
                body: apply_patches(&body, server_patches)?,
            });
        }
        let strip: Vec<Patch> = CREATE_STRIPPED_FIELDS
            .iter()
            .map(|f| Patch::remove_field(f))
            .chain(server_patches.iter().cloned())
            .collect();
        for value in self.to_create.values() {
            requests.push(BatchRequest::Create {
                collection: collection.to_string(),
                body: apply_patches(&serde_json::to_value(value)?, &strip)?,
            });
        }
        for id in &self.to_delete {
            requests.push(BatchRequest::Delete {
                collection: collection.to_string(),
                id: id.clone(),
            });
        }
        Ok(requests)
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Armed, waiting for dispatch.
    Scheduled,
    /// On the wire.
    Pending,
    /// Failed; waits for `retry`.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub staged: Staged<T>,
    pub state: BatchState,
}

/// What an intent did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Added to the staged set.
    Staged,
    /// Merged into an intent already staged or into an unsent batch.
    Folded,
    /// Cancelled an unsent create; nothing will reach the network.
    Cancelled,
    /// Had no effect.
    Ignored(&'static str),
}

// ============================================================================
// MutationState
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MutationState<T> {
    staged: Staged<T>,
    current: Option<Batch<T>>,
}

impl<T> Default for MutationState<T> {
    fn default() -> Self {
        Self {
            staged: Staged::default(),
            current: None,
        }
    }
}

impl<T: SyncRecord> MutationState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staged(&self) -> &Staged<T> {
        &self.staged
    }

    pub fn current(&self) -> Option<&Batch<T>> {
        self.current.as_ref()
    }

    fn current_state(&self) -> Option<BatchState> {
        self.current.as_ref().map(|b| b.state)
    }

    /// Current batch if it is not on the wire.
    fn unsent_current(&mut self) -> Option<&mut Batch<T>> {
        self.current
            .as_mut()
            .filter(|b| b.state != BatchState::Pending)
    }

    // ------------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------------

    pub fn create(&mut self, record: T) -> Intent {
        let id = record.id().to_string();
        if self.staged.to_delete.contains(&id)
            || self.current.as_ref().is_some_and(|b| b.staged.to_delete.contains(&id))
        {
            return Intent::Ignored("record is being deleted");
        }
        if let Some(slot) = self.staged.to_create.get_mut(&id) {
            *slot = record;
            return Intent::Folded;
        }
        if self.current.as_ref().is_some_and(|b| b.staged.to_create.contains_key(&id)) {
            return match self.unsent_current() {
                Some(batch) => {
                    batch.staged.to_create.insert(id, record);
                    Intent::Folded
                }
                None => Intent::Ignored("record is being created"),
            };
        }
        self.staged.to_create.insert(id, record);
        Intent::Staged
    }

    /// Stage `patches` computed against `record`. Empty patch lists are
    /// ignored.
    pub fn update(&mut self, record: &T, patches: Vec<Patch>) -> Result<Intent, PatchError> {
        if patches.is_empty() {
            return Ok(Intent::Ignored("no changes"));
        }
        let id = record.id();
        if self.staged.to_delete.contains(id)
            || self.current.as_ref().is_some_and(|b| b.staged.to_delete.contains(id))
        {
            return Ok(Intent::Ignored("record is being deleted"));
        }
        if let Some(created) = self.staged.to_create.get_mut(id) {
            *created = apply_to(created, &patches)?;
            return Ok(Intent::Folded);
        }
        if self.current.as_ref().is_some_and(|b| b.staged.to_create.contains_key(id)) {
            return match self.unsent_current() {
                Some(batch) => {
                    if let Some(created) = batch.staged.to_create.get_mut(id) {
                        *created = apply_to(created, &patches)?;
                    }
                    Ok(Intent::Folded)
                }
                // The server id is unknown until the create returns.
                None => Ok(Intent::Ignored("record is being created")),
            };
        }
        if let Some(existing) = self.staged.to_update.get_mut(id) {
            existing.patches.extend(patches);
            return Ok(Intent::Folded);
        }
        self.staged.to_update.insert(
            id.to_string(),
            StagedUpdate {
                base: record.clone(),
                patches,
            },
        );
        Ok(Intent::Staged)
    }

    pub fn delete(&mut self, id: &str) -> Intent {
        if self.staged.to_delete.contains(id)
            || self.current.as_ref().is_some_and(|b| b.staged.to_delete.contains(id))
        {
            return Intent::Ignored("already deleted");
        }
        if self.staged.to_create.shift_remove(id).is_some() {
            return Intent::Cancelled;
        }
        if self.current.as_ref().is_some_and(|b| b.staged.to_create.contains_key(id)) {
            return match self.unsent_current() {
                Some(batch) => {
                    batch.staged.to_create.shift_remove(id);
                    Intent::Cancelled
                }
                None => Intent::Ignored("record is being created"),
            };
        }
        self.staged.to_update.shift_remove(id);
        self.staged.to_delete.insert(id.to_string());
        Intent::Staged
    }

    // ------------------------------------------------------------------------
    // Batch lifecycle
    // ------------------------------------------------------------------------

    /// Move staged intents into the batch slot.
    ///
    /// With no current batch this starts a new one. A parked `Scheduled`
    /// batch absorbs the staged intents. Returns whether a `Scheduled` batch
    /// is ready for dispatch.
    pub fn prepare_batch(&mut self) -> Result<bool, PatchError> {
        match self.current_state() {
            None => {
                if self.staged.is_empty() {
                    return Ok(false);
                }
                self.current = Some(Batch {
                    staged: std::mem::take(&mut self.staged),
                    state: BatchState::Scheduled,
                });
                Ok(true)
            }
            Some(BatchState::Scheduled) => {
                self.absorb_staged()?;
                Ok(!self.drop_empty())
            }
            Some(BatchState::Pending) | Some(BatchState::Error) => Ok(false),
        }
    }

    /// `Scheduled → Pending`. Returns the intents to send.
    pub fn mark_dispatched(&mut self) -> Option<&Staged<T>> {
        let batch = self.current.as_mut()?;
        if batch.state != BatchState::Scheduled {
            return None;
        }
        batch.state = BatchState::Pending;
        Some(&batch.staged)
    }

    /// `Pending → Error`.
    pub fn mark_error(&mut self) -> bool {
        self.transition(BatchState::Pending, BatchState::Error)
    }

    /// `Pending → Scheduled`. The batch waits for the next intent or retry.
    pub fn mark_aborted(&mut self) -> bool {
        self.transition(BatchState::Pending, BatchState::Scheduled)
    }

    /// Re-arm a failed or parked batch, merging everything staged since.
    ///
    /// With no current batch this is a plain [`MutationState::prepare_batch`].
    pub fn retry(&mut self) -> Result<bool, PatchError> {
        match self.current_state() {
            Some(BatchState::Error) | Some(BatchState::Scheduled) => {
                self.absorb_staged()?;
                if self.drop_empty() {
                    return Ok(false);
                }
                if let Some(batch) = self.current.as_mut() {
                    batch.state = BatchState::Scheduled;
                }
                Ok(true)
            }
            Some(BatchState::Pending) => Ok(false),
            None => self.prepare_batch(),
        }
    }

    /// `Pending → done`. Returns the completed batch for reconciliation.
    pub fn finish(&mut self) -> Option<Staged<T>> {
        if self.current_state() != Some(BatchState::Pending) {
            return None;
        }
        self.current.take().map(|b| b.staged)
    }

    fn transition(&mut self, from: BatchState, to: BatchState) -> bool {
        match self.current.as_mut() {
            Some(batch) if batch.state == from => {
                batch.state = to;
                true
            }
            _ => false,
        }
    }

    /// Staged intents and the batch are left untouched on error.
    fn absorb_staged(&mut self) -> Result<(), PatchError> {
        let Some(batch) = self.current.as_mut() else {
            return Ok(());
        };
        let mut merged = batch.staged.clone();
        merged.absorb(self.staged.clone())?;
        batch.staged = merged;
        self.staged = Staged::default();
        Ok(())
    }

    /// Clear a batch emptied by cancellations. Returns true if it did.
    fn drop_empty(&mut self) -> bool {
        if self.current.as_ref().is_some_and(|b| b.staged.is_empty()) {
            self.current = None;
            return true;
        }
        false
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn is_error(&self) -> bool {
        self.current_state() == Some(BatchState::Error)
    }

    /// Work is queued or on the wire and nothing has failed.
    pub fn is_pending(&self) -> bool {
        !self.is_error() && (self.current.is_some() || !self.staged.is_empty())
    }

    /// Anything not yet confirmed by the server.
    pub fn has_unsynced(&self) -> bool {
        self.current.is_some() || !self.staged.is_empty()
    }

    pub fn has_updates(&self) -> bool {
        !self.staged.to_update.is_empty()
            || self
                .current
                .as_ref()
                .is_some_and(|b| !b.staged.to_update.is_empty())
    }

    /// Render view: committed records overlaid with every unconfirmed intent.
    ///
    /// Deleted ids are dropped, updated ids show their patched value, and
    /// unconfirmed creates follow the committed records (current batch
    /// first). Records inside a live batch are blocked; records inside a
    /// failed batch carry the error flag.
    pub fn project(&self, committed: &[T], sort: Option<&SortHook<T>>) -> Vec<Optimistic<T>> {
        let empty = Staged::default();
        let (current, current_state) = match &self.current {
            Some(batch) => (&batch.staged, Some(batch.state)),
            None => (&empty, None),
        };
        let in_error = current_state == Some(BatchState::Error);
        let in_flight = matches!(
            current_state,
            Some(BatchState::Scheduled) | Some(BatchState::Pending)
        );
        let tag = |record: T, in_current: bool| Optimistic {
            record,
            is_optimistic: true,
            is_optimistic_blocked: in_current && in_flight,
            is_optimistic_error: in_current && in_error,
        };

        let mut out = Vec::with_capacity(committed.len() + current.to_create.len());
        for record in committed {
            let id = record.id();
            if current.to_delete.contains(id) || self.staged.to_delete.contains(id) {
                continue;
            }
            let in_current = current.to_update.contains_key(id);
            // A staged update's base already carries the current batch's patches.
            let patched = self
                .staged
                .to_update
                .get(id)
                .or_else(|| current.to_update.get(id));
            match patched {
                Some(update) => match update.value() {
                    Ok(value) => out.push(tag(value, in_current)),
                    Err(e) => {
                        error!(id, error = %e, "staged patches do not apply to their base");
                        out.push(Optimistic::committed(record.clone()));
                    }
                },
                None => out.push(Optimistic::committed(record.clone())),
            }
        }
        out.extend(current.to_create.values().cloned().map(|r| tag(r, true)));
        out.extend(self.staged.to_create.values().cloned().map(|r| tag(r, false)));

        if let Some(sort) = sort {
            out.sort_by(|a, b| sort(&a.record, &b.record));
        }
        out
    }
}

/// Patches turning `record` into `f(record)`.
pub fn diff_record<T: SyncRecord>(
    record: &T,
    f: impl FnOnce(&mut T),
) -> Result<Vec<Patch>, PatchError> {
    let mut next = record.clone();
    f(&mut next);
    let before: Value = serde_json::to_value(record)?;
    let after: Value = serde_json::to_value(&next)?;
    diff(&before, &after)
}
