use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Upstream event stream behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Reconnection delay in milliseconds until the server sends `retry:`
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,
    /// Upper bound for the reconnection delay after repeated failures
    #[serde(default = "default_max_retry_ms")]
    pub max_retry_ms: u64,
    /// Timeout for establishing the HTTP connection, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Capacity of the frame channel shared by all streams of a session
    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
    /// Longest line a stream may send before it is discarded
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Base that relative addresses such as `/events` are resolved against
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Per-host-session limits and channel sizes
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
    /// Maximum number of open stream connections per session
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_retry_ms() -> u64 {
    3000
}

fn default_max_retry_ms() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_frame_buffer() -> usize {
    256
}

fn default_max_line_bytes() -> usize {
    1 << 20
}

fn default_command_buffer() -> usize {
    64
}

fn default_notification_buffer() -> usize {
    256
}

fn default_max_connections() -> usize {
    64
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("stream.retry_ms", default_retry_ms())?
            .set_default("stream.max_retry_ms", default_max_retry_ms())?
            .set_default("stream.connect_timeout_secs", default_connect_timeout())?
            .set_default("stream.frame_buffer", default_frame_buffer() as u64)?
            .set_default("stream.max_line_bytes", default_max_line_bytes() as u64)?
            .set_default("session.command_buffer", default_command_buffer() as u64)?
            .set_default("session.notification_buffer", default_notification_buffer() as u64)?
            .set_default("session.max_connections", default_max_connections() as u64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // BRIDGE__SERVER__PORT, BRIDGE__STREAM__BASE_URL, ...
            .add_source(
                Environment::with_prefix("BRIDGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_ms: default_retry_ms(),
            max_retry_ms: default_max_retry_ms(),
            connect_timeout_secs: default_connect_timeout(),
            frame_buffer: default_frame_buffer(),
            max_line_bytes: default_max_line_bytes(),
            base_url: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
            notification_buffer: default_notification_buffer(),
            max_connections: default_max_connections(),
        }
    }
}
