//! Registry statistics and info structures

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stream::ConnectionId;

/// Registry statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub total_listeners: usize,
    pub connections: Vec<ConnectionInfo>,
}

/// One connection as seen from the outside
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub address: String,
    pub opened_at: DateTime<Utc>,
    pub event_types: Vec<String>,
    pub untyped_listener: bool,
}
