//! Graceful shutdown of the bridge.
//!
//! Every session listens on the shutdown broadcast. On the signal it tells
//! its host that the bridge is going away, closes all of its stream
//! connections and unregisters itself. Shutdown waits for that to happen,
//! bounded by a drain timeout.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::timeout;
use uuid::Uuid;

use crate::boundary::SessionStats;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for sessions to close (default: 10 seconds)
    pub drain_timeout: Duration,
    /// How often the session table is checked while draining
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Handles graceful shutdown of the bridge
pub struct GracefulShutdown {
    sessions: Arc<DashMap<Uuid, Arc<SessionStats>>>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        sessions: Arc<DashMap<Uuid, Arc<SessionStats>>>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self::with_config(sessions, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        sessions: Arc<DashMap<Uuid, Arc<SessionStats>>>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            sessions,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_sessions = self.sessions.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let initial = self.sessions.len();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Signaling sessions");
        let signaled = self.shutdown_tx.send(()).unwrap_or(0);

        tracing::info!("Phase 2: Waiting for sessions to close");
        let remaining = self.wait_for_sessions_to_close().await;

        let result = ShutdownResult {
            success: remaining == 0,
            sessions_signaled: signaled,
            sessions_closed: initial.saturating_sub(remaining),
            sessions_remaining: remaining,
            duration: start.elapsed(),
        };

        tracing::info!(
            sessions_signaled = result.sessions_signaled,
            sessions_closed = result.sessions_closed,
            sessions_remaining = result.sessions_remaining,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Returns how many sessions were still registered when the wait ended
    async fn wait_for_sessions_to_close(&self) -> usize {
        let wait_future = async {
            while !self.sessions.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        let _ = timeout(self.config.drain_timeout, wait_future).await;

        let remaining = self.sessions.len();
        if remaining > 0 {
            tracing::warn!(
                remaining_sessions = remaining,
                "Some sessions did not close gracefully"
            );
        }
        remaining
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every session closed before the drain timeout
    pub success: bool,
    /// Number of receivers the shutdown signal reached
    pub sessions_signaled: usize,
    pub sessions_closed: usize,
    pub sessions_remaining: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}
