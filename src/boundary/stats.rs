use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::connection_manager::{ConnectionInfo, RegistryStats};
use crate::notification::{DispatcherStats, DispatcherStatsSnapshot};

/// Live counters for one session, readable from outside the session task
#[derive(Debug)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Registry as of the last applied command
    registry: RwLock<RegistryStats>,
    pub commands_ok: AtomicU64,
    pub commands_rejected: AtomicU64,
    pub dispatch: Arc<DispatcherStats>,
}

impl SessionStats {
    pub fn new(session_id: Uuid, dispatch: Arc<DispatcherStats>) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            registry: RwLock::new(RegistryStats::default()),
            commands_ok: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            dispatch,
        }
    }

    pub fn record_registry(&self, stats: RegistryStats) {
        *self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = stats;
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        let registry = self
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        SessionStatsSnapshot {
            session_id: self.session_id,
            started_at: self.started_at,
            connections: registry.total_connections,
            listeners: registry.total_listeners,
            commands_ok: self.commands_ok.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            dispatch: self.dispatch.snapshot(),
            streams: registry.connections,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatsSnapshot {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub connections: usize,
    pub listeners: usize,
    pub commands_ok: u64,
    pub commands_rejected: u64,
    pub dispatch: DispatcherStatsSnapshot,
    /// Open stream connections with their registered listener types
    pub streams: Vec<ConnectionInfo>,
}
