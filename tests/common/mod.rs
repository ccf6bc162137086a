#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use event_stream_bridge::boundary::{Command, ServerMessage, Session};
use event_stream_bridge::config::Settings;
use event_stream_bridge::stream::MemoryTransport;

/// A session wired to an in-memory transport
pub struct Harness {
    pub session: Session,
    pub transport: MemoryTransport,
    pub outbound: mpsc::Receiver<ServerMessage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let transport = MemoryTransport::new();
        let (tx, outbound) = mpsc::channel(64);
        let session = Session::new(Arc::new(transport.clone()), &settings, tx);
        Self {
            session,
            transport,
            outbound,
        }
    }

    /// Drain everything the session has sent so far
    pub fn sent(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            messages.push(msg);
        }
        messages
    }
}

pub fn create(address: &str) -> Command {
    Command::Create {
        address: address.to_string(),
    }
}

pub fn add_listener(address: &str, event_type: Option<&str>) -> Command {
    Command::AddListener {
        address: address.to_string(),
        event_type: event_type.map(str::to_string),
    }
}

pub fn remove_listener(address: &str, event_type: Option<&str>) -> Command {
    Command::RemoveListener {
        address: address.to_string(),
        event_type: event_type.map(str::to_string),
    }
}

pub fn delete(address: &str) -> Command {
    Command::Delete {
        address: address.to_string(),
    }
}
