//! The host side of the bridge.
//!
//! Hosts speak in [`Command`]s and receive [`ServerMessage`]s. A [`Session`]
//! owns one connection registry and applies commands and inbound frames to
//! it one at a time, so the registry itself needs no lock.

mod message;
mod session;
mod stats;

pub use message::{Command, ServerMessage};
pub use session::Session;
pub use stats::{SessionStats, SessionStatsSnapshot};
