use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;

use crate::boundary::{Command, ServerMessage, Session};
use crate::metrics::{DispatchMetrics, SessionMetrics};
use crate::server::AppState;

/// How long queued messages may take to reach the host after teardown starts
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip_all)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    tracing::debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Which half of the socket finished first
#[derive(Debug)]
enum Finished {
    Sender,
    Receiver,
    Session,
}

/// Run one host session over an established WebSocket
#[tracing::instrument(name = "ws.connection", skip_all)]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let settings = state.settings.clone();
    let (out_tx, mut out_rx) =
        mpsc::channel::<ServerMessage>(settings.session.notification_buffer.max(1));
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(settings.session.command_buffer.max(1));

    let session = Session::new(state.transport.clone(), &settings, out_tx.clone());
    let session_id = session.id();
    state.sessions.insert(session_id, session.stats());
    SessionMetrics::record_attached();
    let started = Instant::now();

    tracing::info!(session_id = %session_id, "Host session attached");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut session_task = tokio::spawn(session.run(cmd_rx, state.shutdown.subscribe()));

    // Task for writing outbound messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Task for reading commands from the socket
    let replies = out_tx;
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &cmd_tx, &replies).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    let finished = tokio::select! {
        _ = &mut send_task => Finished::Sender,
        _ = &mut recv_task => Finished::Receiver,
        _ = &mut session_task => Finished::Session,
    };
    tracing::debug!(session_id = %session_id, finished = ?finished, "Session task completed");

    // Dropping the command sender ends the session, which closes its connections
    recv_task.abort();
    if !matches!(finished, Finished::Session) {
        let _ = session_task.await;
    }

    // Every outbound sender is gone now, so the writer drains and closes
    if !matches!(finished, Finished::Sender) && timeout(FLUSH_TIMEOUT, &mut send_task).await.is_err() {
        tracing::warn!(session_id = %session_id, "Timed out flushing messages to host");
        send_task.abort();
    }

    state.sessions.remove(&session_id);
    SessionMetrics::record_detached();

    tracing::info!(
        session_id = %session_id,
        duration_secs = started.elapsed().as_secs_f64(),
        "Host session detached"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(
    msg: Message,
    commands: &mpsc::Sender<Command>,
    replies: &mpsc::Sender<ServerMessage>,
) -> bool {
    match msg {
        Message::Text(text) => {
            let command: Command = match serde_json::from_str(&text) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse host command");
                    SessionMetrics::record_invalid("parse");
                    reply(replies, ServerMessage::error("INVALID_MESSAGE", e.to_string()));
                    return true;
                }
            };

            // The session has stopped if this fails
            commands.send(command).await.is_ok()
        }
        Message::Binary(_) => {
            SessionMetrics::record_invalid("binary");
            reply(
                replies,
                ServerMessage::error("UNSUPPORTED_FORMAT", "Binary messages are not supported"),
            );
            true
        }
        // axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!("Received close frame");
            false
        }
    }
}

fn reply(replies: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    let kind = message.kind();
    match replies.try_send(message) {
        Ok(()) => DispatchMetrics::record_sent(kind),
        Err(TrySendError::Full(_)) => {
            tracing::warn!(kind = kind, "Outbound channel full, dropping reply");
            DispatchMetrics::record_dropped("full");
        }
        Err(TrySendError::Closed(_)) => DispatchMetrics::record_dropped("closed"),
    }
}
