use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::boundary::SessionStats;
use crate::config::Settings;
use crate::error::AppError;
use crate::stream::{SseTransport, StreamTransport};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Opens the upstream streams of every session
    pub transport: Arc<dyn StreamTransport>,
    /// Attached host sessions by session id
    pub sessions: Arc<DashMap<Uuid, Arc<SessionStats>>>,
    pub shutdown: broadcast::Sender<()>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, transport: Arc<dyn StreamTransport>) -> Self {
        let (shutdown, _) = broadcast::channel(1);

        Self {
            settings: Arc::new(settings),
            transport,
            sessions: Arc::new(DashMap::new()),
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// State backed by real HTTP event streams
    pub fn with_sse(settings: Settings) -> Result<Self, AppError> {
        let transport = SseTransport::new(settings.stream.clone())?;
        Ok(Self::new(settings, Arc::new(transport)))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
