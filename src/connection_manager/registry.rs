use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::BridgeError;
use crate::metrics::RegistryMetrics;
use crate::stream::{ConnectionId, FrameSink, StreamTransport, SubscriptionId};

use super::stats::RegistryStats;
use super::types::{Connection, ConnectionLimits};

/// Owns every stream connection of one session, at most one per address
pub struct ConnectionRegistry {
    transport: Arc<dyn StreamTransport>,
    frames: FrameSink,
    limits: ConnectionLimits,
    /// address -> Connection
    connections: HashMap<String, Connection>,
    /// connection_id -> address
    by_id: HashMap<ConnectionId, String>,
    next_subscription: u64,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn StreamTransport>, frames: FrameSink) -> Self {
        Self::with_limits(transport, frames, ConnectionLimits::default())
    }

    pub fn with_limits(
        transport: Arc<dyn StreamTransport>,
        frames: FrameSink,
        limits: ConnectionLimits,
    ) -> Self {
        Self {
            transport,
            frames,
            limits,
            connections: HashMap::new(),
            by_id: HashMap::new(),
            next_subscription: 0,
        }
    }

    /// Return the connection for `address`, opening it first if needed
    pub fn ensure(&mut self, address: &str) -> Result<&mut Connection, BridgeError> {
        if !self.connections.contains_key(address) {
            self.open(address)?;
        }
        self.get_mut(address)
    }

    fn open(&mut self, address: &str) -> Result<(), BridgeError> {
        if self.connections.len() >= self.limits.max_connections {
            return Err(BridgeError::ConnectionLimitExceeded {
                current: self.connections.len(),
                max: self.limits.max_connections,
            });
        }

        let id = Uuid::new_v4();
        let handle = self.transport.open(id, address, self.frames.clone())?;
        let connection = Connection::new(id, address.to_string(), handle);

        self.by_id.insert(id, address.to_string());
        self.connections.insert(address.to_string(), connection);
        RegistryMetrics::record_opened();

        tracing::info!(connection_id = %id, address = %address, "Stream connection opened");
        Ok(())
    }

    pub fn get(&self, address: &str) -> Result<&Connection, BridgeError> {
        self.connections
            .get(address)
            .ok_or_else(|| BridgeError::address_not_found(address))
    }

    pub fn get_mut(&mut self, address: &str) -> Result<&mut Connection, BridgeError> {
        self.connections
            .get_mut(address)
            .ok_or_else(|| BridgeError::address_not_found(address))
    }

    /// Look up the connection a frame came from
    pub fn by_id(&self, id: ConnectionId) -> Option<&Connection> {
        self.by_id
            .get(&id)
            .and_then(|address| self.connections.get(address))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.connections.contains_key(address)
    }

    /// Register a listener on an existing connection
    pub fn add_listener(
        &mut self,
        address: &str,
        event_type: Option<&str>,
    ) -> Result<SubscriptionId, BridgeError> {
        let connection = self
            .connections
            .get_mut(address)
            .ok_or_else(|| BridgeError::address_not_found(address))?;

        self.next_subscription += 1;
        let id = SubscriptionId::new(self.next_subscription);

        let replaced = connection.add_listener(event_type, id);
        if replaced.is_none() {
            RegistryMetrics::record_listener_added();
        }

        tracing::debug!(
            connection_id = %connection.id,
            address = %address,
            event_type = ?event_type,
            subscription = %id,
            replaced = replaced.is_some(),
            "Listener registered"
        );
        Ok(id)
    }

    pub fn remove_listener(
        &mut self,
        address: &str,
        event_type: Option<&str>,
    ) -> Result<SubscriptionId, BridgeError> {
        let connection = self.get_mut(address)?;
        let id = connection.remove_listener(event_type)?;
        RegistryMetrics::record_listeners_removed(1);

        tracing::debug!(
            connection_id = %connection.id,
            address = %address,
            event_type = ?event_type,
            subscription = %id,
            "Listener removed"
        );
        Ok(id)
    }

    /// Close the connection for `address` and discard all of its listeners
    pub fn remove(&mut self, address: &str) -> Result<(), BridgeError> {
        let mut connection = self
            .connections
            .remove(address)
            .ok_or_else(|| BridgeError::address_not_found(address))?;
        self.by_id.remove(&connection.id);

        let detached = connection.close();
        RegistryMetrics::record_closed(detached);

        tracing::info!(
            connection_id = %connection.id,
            address = %address,
            listeners = detached,
            "Stream connection closed"
        );
        Ok(())
    }

    /// Close every connection; returns how many were closed
    pub fn close_all(&mut self) -> usize {
        let addresses: Vec<String> = self.connections.keys().cloned().collect();
        let count = addresses.len();
        for address in addresses {
            let _ = self.remove(&address);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.connections.values().map(|c| c.listeners().len()).sum()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut connections: Vec<_> = self.connections.values().map(Connection::info).collect();
        connections.sort_by(|a, b| a.address.cmp(&b.address));

        RegistryStats {
            total_connections: self.connections.len(),
            total_listeners: self.listener_count(),
            connections,
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
