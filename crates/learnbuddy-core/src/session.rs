//! Identity-scoped controller lifecycle.
//!
//! A [`Session`] holds at most one [`SyncController`]. Whenever the identity
//! changes, the old controller is shut down (its pending timers are
//! cancelled) and a new one is built against the backend chosen for the new
//! identity.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::generate::StructuredGenerator;
use crate::identity::Identity;
use crate::model::Task;
use crate::store::{LocalStoreConfig, LocalTaskStore, PgTaskStore, TaskStore};
use crate::sync::{Notice, SyncConfig, SyncController, notice_channel};

/// Chooses the store for an identity.
///
/// Signed in with a remote configured: the remote store, namespaced by the
/// identity. Otherwise the local snapshot store if configured. Otherwise
/// nothing, and intents fail with [`SyncError::SignedOut`].
#[derive(Debug, Clone, Default)]
pub struct BackendSelector {
    remote: Option<PgPool>,
    local: Option<LocalStoreConfig>,
}

impl BackendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(mut self, pool: PgPool) -> Self {
        self.remote = Some(pool);
        self
    }

    pub fn with_local(mut self, config: LocalStoreConfig) -> Self {
        self.local = Some(config);
        self
    }

    /// The owner and store to use for `identity`, if any.
    pub async fn select(
        &self,
        identity: Option<&Identity>,
    ) -> Option<(Identity, Arc<dyn TaskStore>)> {
        if let (Some(identity), Some(pool)) = (identity, &self.remote) {
            let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool.clone()));
            return Some((identity.clone(), store));
        }
        let config = self.local.as_ref()?;
        let store: Arc<dyn TaskStore> = Arc::new(LocalTaskStore::open(config).await);
        let owner = identity.cloned().unwrap_or_else(Identity::local);
        Some((owner, store))
    }
}

#[derive(Default)]
struct Active {
    identity: Option<Identity>,
    controller: Option<Arc<SyncController>>,
}

/// Owns the controller for the current identity.
pub struct Session {
    selector: BackendSelector,
    generator: StructuredGenerator,
    config: SyncConfig,
    notices: broadcast::Sender<Notice>,
    active: RwLock<Active>,
}

impl Session {
    pub fn new(
        selector: BackendSelector,
        generator: StructuredGenerator,
        config: SyncConfig,
    ) -> Self {
        Self {
            selector,
            generator,
            config,
            notices: notice_channel(),
            active: RwLock::new(Active::default()),
        }
    }

    /// Notices from every controller this session creates.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.active.read().await.identity.clone()
    }

    /// The active controller, or [`SyncError::SignedOut`] without one.
    pub async fn controller(&self) -> Result<Arc<SyncController>, SyncError> {
        self.active
            .read()
            .await
            .controller
            .clone()
            .ok_or(SyncError::SignedOut)
    }

    /// Current tasks; empty without a controller.
    pub async fn tasks(&self) -> Vec<Task> {
        match self.controller().await {
            Ok(controller) => controller.tasks().await,
            Err(_) => Vec::new(),
        }
    }

    /// Switch to `identity`: drop the current controller, build a new one
    /// and load it. Re-applying the current identity is a no-op.
    ///
    /// A failed load still installs the (empty) controller and returns the
    /// error.
    pub async fn apply_identity(&self, identity: Option<Identity>) -> Result<(), SyncError> {
        let mut active = self.active.write().await;
        if active.controller.is_some() && active.identity == identity {
            return Ok(());
        }

        if let Some(previous) = active.controller.take() {
            previous.shutdown();
        }
        active.identity = identity.clone();

        let Some((owner, store)) = self.selector.select(identity.as_ref()).await else {
            info!("no task store for this identity; tasks unavailable");
            return Ok(());
        };
        info!(owner = %owner, store = store.name(), "starting task session");

        let controller = Arc::new(
            SyncController::new(owner, store, self.generator.clone(), self.config.clone())
                .with_notices(self.notices.clone()),
        );
        active.controller = Some(Arc::clone(&controller));
        drop(active);

        controller.load().await.map(|_| ())
    }

    /// Apply every identity transition seen on `rx` (typically from
    /// [`crate::identity::IdentityProvider::subscribe`]) until its sender is dropped.
    pub async fn follow(&self, mut rx: watch::Receiver<Option<Identity>>) {
        let initial = rx.borrow_and_update().clone();
        if let Err(e) = self.apply_identity(initial).await {
            warn!(error = %e, "initial task load failed");
        }
        while rx.changed().await.is_ok() {
            let next = rx.borrow_and_update().clone();
            if let Err(e) = self.apply_identity(next).await {
                warn!(error = %e, "task reload after identity change failed");
            }
        }
    }
}
