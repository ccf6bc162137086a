//! HTTP endpoints next to the host WebSocket.

mod health;
mod metrics;
mod routes;

pub use health::{health, session_stats, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
