use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Commands sent by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    Create {
        address: String,
    },
    CreateAndListen {
        address: String,
        #[serde(default, rename = "eventType")]
        event_type: Option<String>,
    },
    AddListener {
        address: String,
        #[serde(default, rename = "eventType")]
        event_type: Option<String>,
    },
    RemoveListener {
        address: String,
        #[serde(default, rename = "eventType")]
        event_type: Option<String>,
    },
    Delete {
        address: String,
    },
    Ping,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::CreateAndListen { .. } => "create_and_listen",
            Self::AddListener { .. } => "add_listener",
            Self::RemoveListener { .. } => "remove_listener",
            Self::Delete { .. } => "delete",
            Self::Ping => "ping",
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Create { address }
            | Self::CreateAndListen { address, .. }
            | Self::AddListener { address, .. }
            | Self::RemoveListener { address, .. }
            | Self::Delete { address } => Some(address),
            Self::Ping => None,
        }
    }
}

/// Messages sent to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Frame delivered to a listener registered for its event type
    TypedEvent {
        data: String,
        #[serde(rename = "eventType")]
        event_type: String,
        id: Option<String>,
    },
    /// Frame delivered to the untyped listener
    UntypedEvent { data: String, id: Option<String> },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    Pong,
    /// The bridge is going away; all connections of this session are closed
    Shutdown { reason: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            command: None,
            address: None,
        }
    }

    /// Report a rejected command back to the host
    pub fn rejected(command: &Command, error: &BridgeError) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            command: Some(command.name().to_string()),
            address: command.address().map(str::to_string),
        }
    }

    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown {
            reason: reason.into(),
        }
    }

    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TypedEvent { .. } => "typed",
            Self::UntypedEvent { .. } => "untyped",
            Self::Error { .. } => "error",
            Self::Pong | Self::Shutdown { .. } => "control",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "add_listener",
            "payload": { "address": "/events", "eventType": "price" }
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::AddListener {
                address: "/events".into(),
                event_type: Some("price".into()),
            }
        );

        let cmd: Command = serde_json::from_value(json!({
            "type": "create_and_listen",
            "payload": { "address": "/events" }
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::CreateAndListen {
                address: "/events".into(),
                event_type: None,
            }
        );

        let cmd: Command = serde_json::from_value(json!({
            "type": "remove_listener",
            "payload": { "address": "/events", "eventType": null }
        }))
        .unwrap();
        assert_eq!(cmd.address(), Some("/events"));

        let cmd: Command = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(cmd, Command::Ping);
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        let result: Result<Command, _> =
            serde_json::from_str(r#"{"type":"subscribe","payload":{"address":"/x"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_typed_event_shape() {
        let msg = ServerMessage::TypedEvent {
            data: "42".into(),
            event_type: "price".into(),
            id: Some("7".into()),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "typed_event", "data": "42", "eventType": "price", "id": "7" })
        );
    }

    #[test]
    fn test_untyped_event_shape() {
        let msg = ServerMessage::UntypedEvent {
            data: "ping".into(),
            id: None,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "untyped_event", "data": "ping", "id": null })
        );
    }

    #[test]
    fn test_rejected_command() {
        let cmd = Command::Delete {
            address: "/events".into(),
        };
        let msg = ServerMessage::rejected(&cmd, &BridgeError::address_not_found("/events"));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "error",
                "code": "ADDRESS_NOT_FOUND",
                "message": "No connection for address /events",
                "command": "delete",
                "address": "/events"
            })
        );
    }

    #[test]
    fn test_plain_error_omits_context() {
        let json = ServerMessage::error("INVALID_MESSAGE", "bad json").to_json().unwrap();
        assert_eq!(json, r#"{"type":"error","code":"INVALID_MESSAGE","message":"bad json"}"#);
    }
}
