use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{DictionaryLoader, LoadOutcome, WorkerCommand, WorkerEvent};
use crate::error::Result;
use crate::notify::{Notification, Notifier, RetryAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    CheckingVersion,
    Refreshing,
    Error,
}

// ============================================================================
// WorkerHandle
// ============================================================================

/// Foreground side of the worker. Cheap to clone; the worker task stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    pub fn load(&self) {
        self.send(WorkerCommand::LoadDictionaries);
    }

    pub fn reload(&self) {
        self.send(WorkerCommand::ReloadDictionaries);
    }

    pub fn send(&self, command: WorkerCommand) {
        if self.commands.send(command).is_err() {
            warn!(?command, "dictionary worker has stopped");
        }
    }

    /// Accept a raw JSON message. Unknown actions are ignored.
    pub fn post_message(&self, raw: &str) -> Result<()> {
        let value: Value = serde_json::from_str(raw)?;
        match serde_json::from_value::<WorkerCommand>(value) {
            Ok(command) => self.send(command),
            Err(e) => debug!(error = %e, "ignoring unknown dictionary worker message"),
        }
        Ok(())
    }

    /// Button callback requesting a forced reload. Holds no strong
    /// reference, so it does not keep the worker alive.
    pub fn reload_action(&self) -> RetryAction {
        let commands = self.commands.downgrade();
        RetryAction::new(move || match commands.upgrade() {
            Some(tx) => {
                let _ = tx.send(WorkerCommand::ReloadDictionaries);
            }
            None => warn!("dictionary worker has stopped"),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Resolves once the worker reaches a state satisfying `pred`.
    pub async fn wait_for(&self, pred: impl Fn(WorkerState) -> bool) -> WorkerState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| pred(*s)).await.map(|s| *s);
        match reached {
            Ok(state) => state,
            Err(_) => *rx.borrow(),
        }
    }
}

// ============================================================================
// DictionaryWorker
// ============================================================================

pub struct DictionaryWorker;

impl DictionaryWorker {
    /// Spawn the worker task. It runs one non-forced load immediately.
    ///
    /// Commands that arrive while a load is running are dropped, not queued:
    /// the running load's result stands for them.
    pub fn spawn(loader: DictionaryLoader) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);

        tokio::spawn(run(loader, cmd_rx, event_tx, state_tx));

        (
            WorkerHandle {
                commands: cmd_tx,
                state: state_rx,
            },
            event_rx,
        )
    }
}

async fn run(
    loader: DictionaryLoader,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    state: watch::Sender<WorkerState>,
) {
    let mut next = Some(WorkerCommand::LoadDictionaries);
    loop {
        let command = match next.take() {
            Some(command) => command,
            None => match commands.recv().await {
                Some(command) => command,
                None => break,
            },
        };

        load_once(&loader, command.is_forced(), &events, &state).await;

        while let Ok(dropped) = commands.try_recv() {
            warn!(?dropped, "dictionary refresh already in flight, dropping command");
        }
    }
    debug!("dictionary worker stopped");
}

async fn load_once(
    loader: &DictionaryLoader,
    force: bool,
    events: &mpsc::UnboundedSender<WorkerEvent>,
    state: &watch::Sender<WorkerState>,
) {
    state.send_replace(WorkerState::CheckingVersion);
    let mut emit = |event: WorkerEvent| {
        if let WorkerEvent::Status { message, .. } = &event {
            if message != "No dictionary update required" {
                state.send_replace(WorkerState::Refreshing);
            }
        }
        let _ = events.send(event);
    };

    match loader.load(force, &mut emit).await {
        Ok(LoadOutcome::UpToDate { version }) => {
            debug!(version, "dictionaries up to date");
            state.send_replace(WorkerState::Idle);
        }
        Ok(LoadOutcome::Refreshed { version }) => {
            info!(version, force, "dictionaries loaded");
            state.send_replace(WorkerState::Idle);
        }
        Err(e) => {
            error!(error = %e, "dictionary refresh failed");
            state.send_replace(WorkerState::Error);
            let _ = events.send(WorkerEvent::error(&e));
        }
    }
}

/// Drain worker events: status lines go to the log, failures become a
/// persistent [`Notification::DictionaryError`] offering a forced reload.
pub fn forward_errors(
    handle: &WorkerHandle,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    let reload = handle.reload_action();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                WorkerEvent::Status { message, version } => {
                    debug!(message, version = version.as_deref(), "dictionary worker");
                }
                WorkerEvent::NotifyError { message, error, .. } => {
                    notifier.notify(Notification::DictionaryError {
                        message,
                        error,
                        reload: reload.clone(),
                    });
                }
            }
        }
    })
}
