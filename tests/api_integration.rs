//! HTTP surface tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use event_stream_bridge::boundary::{Command, Session};
use event_stream_bridge::config::Settings;
use event_stream_bridge::server::{create_app, AppState};
use event_stream_bridge::stream::MemoryTransport;

fn state() -> AppState {
    AppState::new(Settings::default(), Arc::new(MemoryTransport::new()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn listen(address: &str, event_type: Option<&str>) -> Command {
    Command::CreateAndListen {
        address: address.to_string(),
        event_type: event_type.map(str::to_string),
    }
}

/// Two connections with three listeners, registered like the socket handler does
fn register_session(state: &AppState) -> Session {
    let (tx, _rx) = mpsc::channel(8);
    let mut session = Session::new(state.transport.clone(), &state.settings, tx);
    session.process(listen("/b", Some("tick"))).unwrap();
    session.process(listen("/a", Some("price"))).unwrap();
    session.process(listen("/a", None)).unwrap();
    state.sessions.insert(session.id(), session.stats());
    session
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get_json(create_app(state()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_stats_sums_sessions() {
    let state = state();
    let _first = register_session(&state);
    let _second = register_session(&state);

    let (status, body) = get_json(create_app(state), "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_sessions"], 2);
    assert_eq!(body["total_connections"], 4);
    assert_eq!(body["total_listeners"], 6);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_session_stats_lookup() {
    let state = state();
    let session = register_session(&state);
    let id = session.id();

    let (status, body) = get_json(create_app(state.clone()), &format!("/stats/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], id.to_string());
    assert_eq!(body["commands_ok"], 3);
    assert_eq!(body["dispatch"]["typed_delivered"], 0);

    // Streams are listed by address with their listener types
    let streams = body["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0]["address"], "/a");
    assert_eq!(streams[0]["event_types"], serde_json::json!(["price"]));
    assert_eq!(streams[0]["untyped_listener"], true);
    assert_eq!(streams[1]["address"], "/b");
    assert_eq!(streams[1]["event_types"], serde_json::json!(["tick"]));
    assert_eq!(streams[1]["untyped_listener"], false);

    let (status, body) =
        get_json(create_app(state), &format!("/stats/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (status, body) = get(create_app(state()), "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("bridge_sessions_active"));
}

#[tokio::test]
async fn test_ws_requires_upgrade() {
    let (status, _) = get(create_app(state()), "/ws").await;
    assert!(status.is_client_error());
}
