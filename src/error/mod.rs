use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by registry and listener mutations.
///
/// These are always recoverable: the session reports them back to the host
/// on the same boundary the command arrived on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("No connection for address {address}")]
    AddressNotFound { address: String },

    #[error("No {} listener on {address}", listener_label(.event_type))]
    ListenerNotFound {
        address: String,
        event_type: Option<String>,
    },

    #[error("Invalid stream address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Connection limit exceeded ({current}/{max})")]
    ConnectionLimitExceeded { current: usize, max: usize },
}

fn listener_label(event_type: &Option<String>) -> String {
    match event_type {
        Some(t) => format!("'{}'", t),
        None => "untyped".to_string(),
    }
}

impl BridgeError {
    pub fn address_not_found(address: impl Into<String>) -> Self {
        Self::AddressNotFound {
            address: address.into(),
        }
    }

    pub fn listener_not_found(address: impl Into<String>, event_type: Option<&str>) -> Self {
        Self::ListenerNotFound {
            address: address.into(),
            event_type: event_type.map(str::to_string),
        }
    }

    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Stable code sent to the host in `error` messages
    pub fn code(&self) -> &'static str {
        match self {
            Self::AddressNotFound { .. } => "ADDRESS_NOT_FOUND",
            Self::ListenerNotFound { .. } => "LISTENER_NOT_FOUND",
            Self::InvalidAddress { .. } => "INVALID_ADDRESS",
            Self::ConnectionLimitExceeded { .. } => "CONNECTION_LIMIT",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, log_msg)
            }
        };

        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_codes() {
        assert_eq!(BridgeError::address_not_found("/a").code(), "ADDRESS_NOT_FOUND");
        assert_eq!(
            BridgeError::listener_not_found("/a", Some("price")).code(),
            "LISTENER_NOT_FOUND"
        );
        assert_eq!(BridgeError::invalid_address("x", "bad").code(), "INVALID_ADDRESS");
        assert_eq!(
            BridgeError::ConnectionLimitExceeded { current: 2, max: 2 }.code(),
            "CONNECTION_LIMIT"
        );
    }

    #[test]
    fn test_listener_not_found_message() {
        let typed = BridgeError::listener_not_found("/events", Some("price"));
        assert_eq!(typed.to_string(), "No 'price' listener on /events");

        let untyped = BridgeError::listener_not_found("/events", None);
        assert_eq!(untyped.to_string(), "No untyped listener on /events");
    }

    #[test]
    fn test_not_found_response_status() {
        let response = AppError::NotFound("session".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
