//! Service container for one signed-in planner session.
//!
//! Wires configuration, the remote client, auth, the shared caches, the
//! notifier, the pending plan queue and the dictionary worker, and hands out
//! editors bound to these collaborators.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{DictionaryIndex, ReferenceStore};
use crate::config::AppConfig;
use crate::dictionary::{forward_errors, DictionaryLoader, DictionaryWorker, WorkerHandle};
use crate::emitter::Subscription;
use crate::error::{PlanSyncError, Result};
use crate::mutation::{EngineOptions, EngineServices};
use crate::notify::{Notifier, TracingNotifier};
use crate::pending::PendingPlanQueue;
use crate::plans::{
    ArtifactSetsEditor, ArtifactTypesEditor, PlanEditor, PlansCache, TeamsEditor, WeaponsEditor,
};
use crate::registry::PendingStatusRegistry;
use crate::remote::{AuthStore, RemoteClient};

pub struct PlannerContext {
    config: AppConfig,
    remote: Arc<dyn RemoteClient>,
    auth: Arc<AuthStore>,
    store: Arc<dyn ReferenceStore>,
    plans: Arc<PlansCache>,
    registry: Arc<PendingStatusRegistry>,
    notifier: Arc<dyn Notifier>,
    pending: PendingPlanQueue,
    dictionary: WorkerHandle,
    forwarder: JoinHandle<()>,
    _auth_binding: Subscription,
}

#[derive(Default)]
pub struct PlannerContextBuilder {
    remote: Option<Arc<dyn RemoteClient>>,
    auth: Option<Arc<AuthStore>>,
    store: Option<Arc<dyn ReferenceStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl PlannerContextBuilder {
    pub fn remote(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn auth(mut self, auth: Arc<AuthStore>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn store(mut self, store: Arc<dyn ReferenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Fill the gaps from `config` and start the dictionary worker. Must be
    /// called inside a tokio runtime.
    pub fn build(self, config: AppConfig) -> Result<PlannerContext> {
        let auth = match self.auth {
            Some(auth) => auth,
            None => Arc::new(AuthStore::persistent(
                &config.session_path,
                config.auth_storage_key.clone(),
            )),
        };
        let remote = match self.remote {
            Some(remote) => remote,
            None => default_remote(&config, &auth)?,
        };
        let store = match self.store {
            Some(store) => store,
            None => default_store(&config)?,
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));

        let plans = Arc::new(PlansCache::new());
        let registry = Arc::new(PendingStatusRegistry::new());
        let pending = PendingPlanQueue::new(
            remote.clone(),
            auth.clone(),
            plans.clone(),
            notifier.clone(),
            config.pending_plan_attempts,
        );
        let auth_binding = pending.bind_to_auth();

        let (dictionary, events) =
            DictionaryWorker::spawn(DictionaryLoader::new(remote.clone(), store.clone()));
        let forwarder = forward_errors(&dictionary, events, notifier.clone());

        info!(backend = %config.backend_url, env = %config.app_env, "planner context ready");
        Ok(PlannerContext {
            config,
            remote,
            auth,
            store,
            plans,
            registry,
            notifier,
            pending,
            dictionary,
            forwarder,
            _auth_binding: auth_binding,
        })
    }
}

#[cfg(feature = "http")]
fn default_remote(config: &AppConfig, auth: &Arc<AuthStore>) -> Result<Arc<dyn RemoteClient>> {
    let client = crate::remote::HttpRemoteClient::new(
        &config.backend_url,
        auth.clone(),
        config.request_timeout(),
    )?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "http"))]
fn default_remote(_: &AppConfig, _: &Arc<AuthStore>) -> Result<Arc<dyn RemoteClient>> {
    Err(PlanSyncError::Internal(
        "no remote client configured and the http feature is disabled".into(),
    ))
}

#[cfg(feature = "sqlite")]
fn default_store(config: &AppConfig) -> Result<Arc<dyn ReferenceStore>> {
    Ok(Arc::new(crate::cache::SqliteStore::open(&config.cache_path)?))
}

#[cfg(not(feature = "sqlite"))]
fn default_store(_: &AppConfig) -> Result<Arc<dyn ReferenceStore>> {
    Ok(Arc::new(crate::cache::MemoryStore::new()))
}

impl PlannerContext {
    pub fn builder() -> PlannerContextBuilder {
        PlannerContextBuilder::default()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn remote(&self) -> &Arc<dyn RemoteClient> {
        &self.remote
    }

    pub fn auth(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    pub fn store(&self) -> &Arc<dyn ReferenceStore> {
        &self.store
    }

    pub fn plans(&self) -> &Arc<PlansCache> {
        &self.plans
    }

    pub fn registry(&self) -> &Arc<PendingStatusRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn pending(&self) -> &PendingPlanQueue {
        &self.pending
    }

    pub fn dictionary(&self) -> &WorkerHandle {
        &self.dictionary
    }

    /// Typed view of the reference cache. A lookup miss asks the worker for
    /// a forced reload.
    pub fn dictionary_index(&self) -> Result<DictionaryIndex> {
        let worker = self.dictionary.clone();
        let index = DictionaryIndex::load(self.store.as_ref())?
            .with_miss_handler(move |_, _| worker.reload());
        Ok(index)
    }

    /// Reload every plan from the backend.
    pub async fn refresh_plans(&self) -> Result<()> {
        if !self.auth.is_valid() {
            return Err(PlanSyncError::Unauthenticated);
        }
        self.plans.refresh(self.remote.as_ref()).await
    }

    /// Drop the session and every per-user cache. The pending queue clears
    /// itself through its auth binding.
    pub fn logout(&self) {
        self.auth.clear();
        self.plans.clear();
    }

    // ------------------------------------------------------------------------
    // Editors
    // ------------------------------------------------------------------------

    pub fn services(&self) -> EngineServices {
        EngineServices {
            remote: self.remote.clone(),
            plans: self.plans.clone(),
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
        }
    }

    fn options<T>(&self) -> EngineOptions<T> {
        EngineOptions {
            debounce: self.config.mutation_debounce(),
            ..EngineOptions::default()
        }
    }

    pub fn plan_editor(&self) -> PlanEditor {
        PlanEditor::new(self.services(), self.config.plan_debounce())
    }

    pub fn artifact_sets(&self, plan_id: &str) -> ArtifactSetsEditor {
        ArtifactSetsEditor::new(plan_id, self.services(), self.options())
    }

    pub fn artifact_types(&self, plan_id: &str) -> ArtifactTypesEditor {
        ArtifactTypesEditor::new(plan_id, self.services(), self.options())
    }

    pub fn weapons(&self, plan_id: &str) -> WeaponsEditor {
        WeaponsEditor::new(plan_id, self.services(), self.options())
    }

    pub fn teams(&self, plan_id: &str, character: &str) -> TeamsEditor {
        TeamsEditor::new(plan_id, character, self.services(), self.options())
    }
}

impl Drop for PlannerContext {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}
