// Shared components
pub mod config;
pub mod error;
pub mod metrics;

// Core: stream connections, listeners and dispatch
pub mod connection_manager;
pub mod notification;
pub mod stream;

// Host boundary
pub mod boundary;
pub mod websocket;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod shutdown;
