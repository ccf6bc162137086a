//! Prometheus metrics for the event stream bridge.
//!
//! Covers host sessions, upstream stream connections and their reconnects,
//! registered listeners, frame routing and notifications sent to hosts.

mod helpers;

pub use helpers::{
    encode_metrics, CommandMetrics, DispatchMetrics, RegistryMetrics, SessionMetrics,
    StreamMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "bridge";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Number of attached host sessions
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_sessions_active", METRIC_PREFIX),
        "Number of attached host sessions"
    ).unwrap();

    /// Commands processed by command and outcome
    pub static ref COMMANDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_commands_total", METRIC_PREFIX),
        "Total host commands processed",
        &["command", "outcome"]
    ).unwrap();

    /// Host messages that could not be parsed as commands
    pub static ref INVALID_MESSAGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_invalid_messages_total", METRIC_PREFIX),
        "Total host messages rejected before reaching a session",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Stream Metrics
    // ============================================================================

    /// Stream connections currently held open
    pub static ref STREAM_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_stream_connections_active", METRIC_PREFIX),
        "Number of open upstream stream connections"
    ).unwrap();

    /// Stream connections opened
    pub static ref STREAM_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_stream_connections_opened_total", METRIC_PREFIX),
        "Total upstream stream connections opened"
    ).unwrap();

    /// Successful HTTP connects, including reconnects
    pub static ref STREAM_CONNECTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stream_connects_total", METRIC_PREFIX),
        "Total successful event stream connects"
    ).unwrap();

    /// Failed connects by kind (retryable, fatal)
    pub static ref STREAM_CONNECT_FAILURES: IntCounterVec = register_int_counter_vec!(
        format!("{}_stream_connect_failures_total", METRIC_PREFIX),
        "Total failed event stream connects",
        &["kind"]
    ).unwrap();

    /// Scheduled reconnection attempts
    pub static ref STREAM_RECONNECTS: IntCounter = register_int_counter!(
        format!("{}_stream_reconnects_total", METRIC_PREFIX),
        "Total event stream reconnection attempts"
    ).unwrap();

    // ============================================================================
    // Listener and Frame Metrics
    // ============================================================================

    /// Listeners currently registered
    pub static ref LISTENERS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_listeners_active", METRIC_PREFIX),
        "Number of registered listeners across all sessions"
    ).unwrap();

    /// Frames decoded from upstream streams
    pub static ref FRAMES_RECEIVED: IntCounter = register_int_counter!(
        format!("{}_frames_received_total", METRIC_PREFIX),
        "Total frames decoded from event streams"
    ).unwrap();

    /// Frames discarded before reaching the host, by reason
    pub static ref FRAMES_DISCARDED: IntCounterVec = register_int_counter_vec!(
        format!("{}_frames_discarded_total", METRIC_PREFIX),
        "Total frames discarded before notification",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Messages queued for hosts by kind
    pub static ref NOTIFICATIONS_SENT: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_sent_total", METRIC_PREFIX),
        "Total messages queued for hosts",
        &["kind"]
    ).unwrap();

    /// Messages dropped because the host channel was full or closed
    pub static ref NOTIFICATIONS_DROPPED: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_dropped_total", METRIC_PREFIX),
        "Total messages dropped on the way to hosts",
        &["reason"]
    ).unwrap();
}
