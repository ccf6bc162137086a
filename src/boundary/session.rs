use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::Settings;
use crate::connection_manager::{ConnectionLimits, ConnectionRegistry};
use crate::error::BridgeError;
use crate::metrics::CommandMetrics;
use crate::notification::{DispatchOutcome, EventDispatcher};
use crate::stream::{InboundFrame, StreamTransport};

use super::message::{Command, ServerMessage};
use super::stats::SessionStats;

const SHUTDOWN_REASON: &str = "server shutting down";

/// One host attachment.
///
/// Commands and frames are applied on the task running [`Session::run`],
/// each to completion before the next one is looked at.
pub struct Session {
    id: Uuid,
    registry: ConnectionRegistry,
    dispatcher: EventDispatcher,
    frames: mpsc::Receiver<InboundFrame>,
    stats: Arc<SessionStats>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        settings: &Settings,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        let id = Uuid::new_v4();
        let (frames_tx, frames) = mpsc::channel(settings.stream.frame_buffer.max(1));
        let registry = ConnectionRegistry::with_limits(
            transport,
            frames_tx,
            ConnectionLimits {
                max_connections: settings.session.max_connections,
            },
        );
        let dispatcher = EventDispatcher::new(outbound);
        let stats = Arc::new(SessionStats::new(id, dispatcher.stats()));

        Self {
            id,
            registry,
            dispatcher,
            frames,
            stats,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Apply one command to the registry
    pub fn handle_command(&mut self, command: &Command) -> Result<(), BridgeError> {
        match command {
            Command::Create { address } => {
                self.registry.ensure(address)?;
            }
            Command::CreateAndListen {
                address,
                event_type,
            } => {
                self.registry.ensure(address)?;
                self.registry.add_listener(address, event_type.as_deref())?;
            }
            Command::AddListener {
                address,
                event_type,
            } => {
                self.registry.add_listener(address, event_type.as_deref())?;
            }
            Command::RemoveListener {
                address,
                event_type,
            } => {
                self.registry.remove_listener(address, event_type.as_deref())?;
            }
            Command::Delete { address } => {
                self.registry.remove(address)?;
            }
            Command::Ping => {
                self.dispatcher.send(ServerMessage::Pong);
            }
        }
        Ok(())
    }

    /// Apply a command and report a rejection back to the host
    pub fn process(&mut self, command: Command) -> Result<(), BridgeError> {
        let result = self.handle_command(&command);

        match &result {
            Ok(()) => {
                self.stats.commands_ok.fetch_add(1, Ordering::Relaxed);
                CommandMetrics::record_ok(command.name());
                tracing::debug!(
                    session_id = %self.id,
                    command = command.name(),
                    address = ?command.address(),
                    "Command applied"
                );
            }
            Err(e) => {
                self.stats.commands_rejected.fetch_add(1, Ordering::Relaxed);
                CommandMetrics::record_rejected(command.name());
                tracing::info!(
                    session_id = %self.id,
                    command = command.name(),
                    code = e.code(),
                    error = %e,
                    "Command rejected"
                );
                self.dispatcher.send(ServerMessage::rejected(&command, e));
            }
        }

        self.sync_stats();
        result
    }

    pub fn dispatch(&self, inbound: InboundFrame) -> DispatchOutcome {
        self.dispatcher.dispatch(&self.registry, inbound)
    }

    /// Dispatch every frame already waiting; returns how many were handled
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(inbound) = self.frames.try_recv() {
            self.dispatch(inbound);
            handled += 1;
        }
        handled
    }

    /// Close every connection of this session
    pub fn close(&mut self) -> usize {
        let closed = self.registry.close_all();
        self.sync_stats();
        closed
    }

    fn sync_stats(&self) {
        self.stats.record_registry(self.registry.stats());
    }

    /// Drive the session until the host goes away or shutdown is broadcast
    #[tracing::instrument(name = "session.run", skip_all, fields(session_id = %self.id))]
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!("Session started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received");
                    self.dispatcher.send(ServerMessage::shutdown(SHUTDOWN_REASON));
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        let _ = self.process(command);
                    }
                    None => {
                        tracing::debug!("Command channel closed");
                        break;
                    }
                },
                Some(inbound) = self.frames.recv() => {
                    self.dispatch(inbound);
                }
            }
        }

        let closed = self.close();
        tracing::info!(connections_closed = closed, "Session ended");
    }
}
