use axum::{routing::get, Router};

use crate::server::AppState;

use super::health::{health, session_stats, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/stats/{session_id}", get(session_stats))
        .route("/metrics", get(prometheus_metrics))
}
