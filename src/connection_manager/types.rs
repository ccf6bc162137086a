//! Connection and related types

use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::stream::{ConnectionId, Frame, StreamHandle, SubscriptionId};

use super::listeners::{ListenerTable, Route};
use super::stats::ConnectionInfo;

/// One live stream address: the physical handle plus its listeners
pub struct Connection {
    pub id: ConnectionId,
    pub address: String,
    pub opened_at: DateTime<Utc>,
    handle: Box<dyn StreamHandle>,
    listeners: ListenerTable,
}

impl Connection {
    pub fn new(id: ConnectionId, address: String, handle: Box<dyn StreamHandle>) -> Self {
        Self {
            id,
            address,
            opened_at: Utc::now(),
            handle,
            listeners: ListenerTable::new(),
        }
    }

    /// Add a typed listener, or the untyped one when `event_type` is `None`.
    /// Returns the registration that was replaced, if any.
    pub fn add_listener(
        &mut self,
        event_type: Option<&str>,
        id: SubscriptionId,
    ) -> Option<SubscriptionId> {
        match event_type {
            Some(t) => self.listeners.add_typed(self.handle.as_mut(), t, id),
            None => self.listeners.add_untyped(self.handle.as_mut(), id),
        }
    }

    pub fn remove_listener(&mut self, event_type: Option<&str>) -> Result<SubscriptionId, BridgeError> {
        let removed = match event_type {
            Some(t) => self.listeners.remove_typed(self.handle.as_mut(), t),
            None => self.listeners.remove_untyped(self.handle.as_mut()),
        };
        removed.ok_or_else(|| BridgeError::listener_not_found(&self.address, event_type))
    }

    pub fn route(&self, frame: &Frame) -> Option<Route<'_>> {
        self.listeners.route(frame)
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    /// Detach every listener, then close the handle.
    /// Returns the number of listeners that were detached.
    pub fn close(&mut self) -> usize {
        let detached = self.listeners.detach_all(self.handle.as_mut());
        self.handle.close();
        detached
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: self.id,
            address: self.address.clone(),
            opened_at: self.opened_at,
            event_types: self.listeners.event_types(),
            untyped_listener: self.listeners.untyped_listener().is_some(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// Limits for connection management
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_connections: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: 64,
        }
    }
}
