//! Address → connection registry and per-connection listener tables.
//!
//! Everything here is owned by exactly one session and mutated from a single
//! task, so plain maps are used and no locking is involved.

mod listeners;
mod registry;
mod stats;
mod types;

pub use listeners::{ListenerTable, Route};
pub use registry::ConnectionRegistry;
pub use stats::{ConnectionInfo, RegistryStats};
pub use types::{Connection, ConnectionLimits};
