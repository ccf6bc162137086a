//! Health check and statistics endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::boundary::SessionStatsSnapshot;
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_sessions: usize,
    pub total_connections: usize,
    pub total_listeners: usize,
    pub sessions: Vec<SessionStatsSnapshot>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        sessions: state.session_count(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let mut sessions: Vec<SessionStatsSnapshot> = state
        .sessions
        .iter()
        .map(|entry| entry.value().snapshot())
        .collect();
    sessions.sort_by_key(|s| s.started_at);

    Json(StatsResponse {
        total_sessions: sessions.len(),
        total_connections: sessions.iter().map(|s| s.connections).sum(),
        total_listeners: sessions.iter().map(|s| s.listeners).sum(),
        sessions,
    })
}

pub async fn session_stats(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionStatsSnapshot>> {
    state
        .sessions
        .get(&session_id)
        .map(|entry| Json(entry.value().snapshot()))
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
}
