//! End-to-end transport tests.
//!
//! These run the client against a mock NPJWI server over real HTTP
//! connections on localhost.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use npjwi::classifier::ErrorCategory;
use npjwi::config::ClientConfig;
use npjwi::events::ClientEvent;
use npjwi::protocol::{IsSessionActive, Request, Response, SessionActivity};
use npjwi::transport::{ExchangeOutcome, HttpTransport, Transport};
use npjwi::{Client, NpjwiError, SessionState};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::timeout;

#[derive(Default)]
struct MockServer {
    pulls: AtomicUsize,
    fail_pushes: bool,
}

async fn handle(
    State(mock): State<Arc<MockServer>>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let session_id = request["sessionID"].clone();
    let reply = match request["requestType"].as_str().unwrap_or_default() {
        "StartSession" => json!({
            "responseType": "SessionStarted",
            "sessionID": "S1",
            "remoteMessageQueuing": "SDN",
        }),
        "PullAgentMessage" => {
            if mock.pulls.fetch_add(1, Ordering::SeqCst) == 0 {
                json!({
                    "responseType": "AgentMessage",
                    "sessionID": session_id,
                    "agentMessageID": "A1",
                    "agentMessageType": "Complete",
                    "say": [{"visual": "Welcome"}],
                    "do": {"stateChanges": {"Mode": "Chat"}},
                })
            } else {
                tokio::time::sleep(Duration::from_millis(100)).await;
                json!({"responseType": "TimeoutNoMessage", "sessionID": session_id})
            }
        }
        "PushClientMessage" if mock.fail_pushes => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }
        "PushClientMessage" => json!({
            "responseType": "ReceivedClientMessage",
            "sessionID": session_id,
            "clientMessageID": request["clientMessageID"],
        }),
        "EndSession" => json!({"responseType": "SessionEnded", "sessionID": session_id}),
        "IsSessionActive" => json!({
            "responseType": "SessionStatus",
            "sessionID": session_id,
            "status": "Active",
        }),
        _ => json!({
            "responseType": "Error",
            "errorCode": "ERR_CLIENT_INVALID_REQUEST",
            "errorMessage": "unsupported",
        }),
    };
    (StatusCode::OK, Json(reply))
}

/// Start the mock server; returns its endpoint URL
async fn spawn_server(mock: MockServer) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let router = Router::new()
        .route("/npjwi", post(handle))
        .with_state(Arc::new(mock));

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/npjwi")
}

fn config(endpoint: String) -> ClientConfig {
    let mut config = ClientConfig::with_endpoint(endpoint);
    config.profile.app_id = "demo".to_string();
    config
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<ClientEvent>, mut matches: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not seen in time")
}

#[tokio::test]
async fn test_http_transport_exchange() {
    let endpoint = spawn_server(MockServer::default()).await;
    let transport = HttpTransport::new(endpoint.parse().unwrap()).unwrap();

    let outcome = transport
        .exchange(
            json!({"requestType": "EndSession", "sessionID": "S7"}).to_string(),
            Duration::from_secs(5),
        )
        .await;

    let ExchangeOutcome::Completed { status, body } = outcome else {
        panic!("expected a completed exchange, got {outcome:?}");
    };
    assert_eq!(status, 200);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["responseType"], "SessionEnded");
    assert_eq!(value["sessionID"], "S7");
}

#[tokio::test]
async fn test_http_transport_times_out() {
    let endpoint = spawn_server(MockServer {
        pulls: AtomicUsize::new(1),
        ..Default::default()
    })
    .await;
    let transport = HttpTransport::new(endpoint.parse().unwrap()).unwrap();

    // Every poll after the first sleeps longer than this
    let outcome = transport
        .exchange(
            json!({"requestType": "PullAgentMessage", "sessionID": "S1"}).to_string(),
            Duration::from_millis(20),
        )
        .await;
    assert_eq!(outcome, ExchangeOutcome::TimedOut);
}

#[tokio::test]
async fn test_client_session_over_http() {
    let endpoint = spawn_server(MockServer::default()).await;
    let client = Client::connect(config(endpoint)).unwrap();
    let mut events = client.subscribe();

    client.start().await.unwrap();
    let started = wait_for(&mut events, |e| matches!(e, ClientEvent::SessionStarted { .. })).await;
    assert!(matches!(started, ClientEvent::SessionStarted { session_id, .. } if session_id == "S1"));

    let states = wait_for(&mut events, |e| matches!(e, ClientEvent::ContextStatesChanged(_))).await;
    assert!(matches!(states, ClientEvent::ContextStatesChanged(s) if s["Mode"] == "Chat"));
    let ClientEvent::AgentMessage(message) =
        wait_for(&mut events, |e| matches!(e, ClientEvent::AgentMessage(_))).await
    else {
        unreachable!()
    };
    assert_eq!(message.agent_message_id, "A1");
    assert_eq!(message.content["say"][0]["visual"], "Welcome");

    let id = client.send_text("  hello  ").await.unwrap();
    assert_eq!(id, "client_0");
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::ClientMessageReceived { client_message_id } if client_message_id == "client_0")
    })
    .await;

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.cursor, "A1");
    assert_eq!(snapshot.context_states["Mode"], "Chat");

    client.end().await.unwrap();
    wait_for(&mut events, |e| matches!(e, ClientEvent::SessionEnded { .. })).await;
    assert_eq!(
        client.snapshot().await.unwrap().state,
        SessionState::Disconnected(None)
    );
    client.shutdown().await;
}

#[tokio::test]
async fn test_http_error_status_classified() {
    let endpoint = spawn_server(MockServer {
        fail_pushes: true,
        ..Default::default()
    })
    .await;
    let client = Client::connect(config(endpoint)).unwrap();
    let mut events = client.subscribe();

    client.start().await.unwrap();
    wait_for(&mut events, |e| matches!(e, ClientEvent::SessionStarted { .. })).await;
    client.send_text("hello").await.unwrap();

    let ClientEvent::Error(error) = wait_for(&mut events, |e| e.as_error().is_some()).await else {
        unreachable!()
    };
    assert_eq!(error.error_code, "ERR_SYSTEM_ERROR");
    assert_eq!(error.category, ErrorCategory::Server);
    assert_eq!(error.request_type.as_deref(), Some("PushClientMessage"));

    // The session id is kept for a liveness check
    let snapshot = client.snapshot().await.unwrap();
    assert!(matches!(snapshot.state, SessionState::Disconnected(Some(_))));
    client.shutdown().await;
}

#[tokio::test]
async fn test_call_direct_over_http() {
    let endpoint = spawn_server(MockServer::default()).await;
    let client = Client::connect(config(endpoint)).unwrap();

    let response = client
        .call_direct(Request::IsSessionActive(IsSessionActive {
            app_id: "demo".into(),
            session_id: "S9".into(),
        }))
        .await
        .unwrap();
    let Response::SessionStatus(status) = response else {
        panic!("expected SessionStatus, got {response:?}");
    };
    assert_eq!(status.session_id, "S9");
    assert_eq!(status.status, SessionActivity::Active);
    client.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::connect(config(format!("http://{addr}/npjwi"))).unwrap();
    let result = client
        .call_direct(Request::IsSessionActive(IsSessionActive {
            app_id: "demo".into(),
            session_id: "S1".into(),
        }))
        .await;
    assert!(matches!(result, Err(NpjwiError::Network(_))));
    client.shutdown().await;
}
