//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    COMMANDS_TOTAL, FRAMES_DISCARDED, FRAMES_RECEIVED, INVALID_MESSAGES_TOTAL, LISTENERS_ACTIVE,
    NOTIFICATIONS_DROPPED, NOTIFICATIONS_SENT, SESSIONS_ACTIVE, STREAM_CONNECTIONS_ACTIVE,
    STREAM_CONNECTIONS_OPENED, STREAM_CONNECTS_TOTAL, STREAM_CONNECT_FAILURES, STREAM_RECONNECTS,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording host session metrics
pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_attached() {
        SESSIONS_ACTIVE.inc();
    }

    pub fn record_detached() {
        SESSIONS_ACTIVE.dec();
    }

    /// Record a host message that never became a command
    pub fn record_invalid(reason: &str) {
        INVALID_MESSAGES_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording command outcomes
pub struct CommandMetrics;

impl CommandMetrics {
    pub fn record_ok(command: &str) {
        COMMANDS_TOTAL.with_label_values(&[command, "ok"]).inc();
    }

    pub fn record_rejected(command: &str) {
        COMMANDS_TOTAL.with_label_values(&[command, "rejected"]).inc();
    }
}

/// Helper struct for recording registry changes
pub struct RegistryMetrics;

impl RegistryMetrics {
    pub fn record_opened() {
        STREAM_CONNECTIONS_OPENED.inc();
        STREAM_CONNECTIONS_ACTIVE.inc();
    }

    /// Record a closed connection and the listeners it still had
    pub fn record_closed(listeners: usize) {
        STREAM_CONNECTIONS_ACTIVE.dec();
        LISTENERS_ACTIVE.sub(listeners as i64);
    }

    pub fn record_listener_added() {
        LISTENERS_ACTIVE.inc();
    }

    pub fn record_listeners_removed(count: usize) {
        LISTENERS_ACTIVE.sub(count as i64);
    }
}

/// Helper struct for recording stream reader activity
pub struct StreamMetrics;

impl StreamMetrics {
    pub fn record_connected() {
        STREAM_CONNECTS_TOTAL.inc();
    }

    /// Record a failed connect (`retryable` or `fatal`)
    pub fn record_failed(kind: &str) {
        STREAM_CONNECT_FAILURES.with_label_values(&[kind]).inc();
    }

    pub fn record_reconnect() {
        STREAM_RECONNECTS.inc();
    }

    pub fn record_frame() {
        FRAMES_RECEIVED.inc();
    }

    /// Record a frame dropped by the reader because nobody listens for it
    pub fn record_filtered() {
        FRAMES_DISCARDED.with_label_values(&["filtered"]).inc();
    }
}

/// Helper struct for recording dispatch results
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a message queued for the host
    pub fn record_sent(kind: &str) {
        NOTIFICATIONS_SENT.with_label_values(&[kind]).inc();
    }

    /// Record a message lost because the host channel was full or closed
    pub fn record_dropped(reason: &str) {
        NOTIFICATIONS_DROPPED.with_label_values(&[reason]).inc();
    }

    /// Record a frame the session discarded (`unrouted`, `stale_connection`)
    pub fn record_discarded(reason: &str) {
        FRAMES_DISCARDED.with_label_values(&[reason]).inc();
    }
}
