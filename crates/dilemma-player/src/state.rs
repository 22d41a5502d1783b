//! Application state management.

use chrono::{DateTime, Utc};
use dilemma_core::roster::RosterEntry;
use dilemma_core::{Backend, DealEngine, PlayerProfile, SessionStore};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// One coherent view of the world, produced by the shared refresh loop and
/// read by every panel. Panels never poll the backend themselves.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Snapshot {
    pub profile: Option<PlayerProfile>,
    pub roster: Vec<RosterEntry>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub store: Arc<SessionStore>,
    engine: Arc<RwLock<Option<Arc<DealEngine>>>>,
    snapshot_tx: Arc<watch::Sender<Snapshot>>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, store: SessionStore) -> Self {
        let (tx, _) = watch::channel(Snapshot::default());
        Self {
            backend,
            store: Arc::new(store),
            engine: Arc::new(RwLock::new(None)),
            snapshot_tx: Arc::new(tx),
        }
    }

    /// The engine for the logged-in session, if any.
    pub fn engine(&self) -> Option<Arc<DealEngine>> {
        self.engine.read().unwrap().clone()
    }

    /// Install the engine on login, drop it on logout.
    pub fn set_engine(&self, engine: Option<Arc<DealEngine>>) {
        *self.engine.write().unwrap() = engine;
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let _ = self.snapshot_tx.send_replace(snapshot);
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }
}
