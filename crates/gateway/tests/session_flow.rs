#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the WebSocket session state machine:
//! handshake, greeting delivery, reconnects, and dispatch.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::net::TcpListener,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
};

use {
    convoy_channels::SenderRegistry,
    convoy_config::{ChannelConfig, ChannelKind, ConvoyConfig},
    convoy_gateway::{
        server::{AppState, build_gateway_app, build_runtime},
        services::{AgentContext, AgentError, AgentReply, AgentService, NoopEmbeddingService, TokenUsage},
    },
};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ── Test agent ───────────────────────────────────────────────────────────────

struct EchoAgent {
    calls: AtomicUsize,
    greeting_delay: Duration,
}

impl EchoAgent {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            greeting_delay: Duration::ZERO,
        }
    }

    fn with_greeting_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            greeting_delay: delay,
        }
    }
}

#[async_trait]
impl AgentService for EchoAgent {
    async fn generate_reply(&self, ctx: AgentContext) -> Result<AgentReply, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = match ctx.content {
            Some(c) => format!("echo: {c}"),
            None => {
                tokio::time::sleep(self.greeting_delay).await;
                "generated greeting".to_string()
            },
        };
        Ok(AgentReply {
            text,
            usage: TokenUsage::default(),
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

fn test_config() -> ConvoyConfig {
    let mut config = ConvoyConfig::default();
    config.channels = vec![
        ChannelConfig {
            id: "web-main".into(),
            name: "Website".into(),
            kind: ChannelKind::Web,
            active: true,
            greeting: Some("Welcome aboard!".into()),
        },
        ChannelConfig {
            id: "web-quiet".into(),
            name: "No fixed greeting".into(),
            kind: ChannelKind::Web,
            active: true,
            greeting: None,
        },
        ChannelConfig {
            id: "web-off".into(),
            name: "Disabled".into(),
            kind: ChannelKind::Web,
            active: false,
            greeting: None,
        },
    ];
    config
}

async fn start_server(config: ConvoyConfig, agent: Arc<dyn AgentService>) -> (SocketAddr, AppState) {
    let app_state = build_runtime(
        &config,
        agent,
        Arc::new(NoopEmbeddingService),
        Arc::new(SenderRegistry::new()),
    )
    .await
    .unwrap();

    let app = build_gateway_app(app_state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, app_state)
}

async fn fetch_ticket(addr: SocketAddr, user_id: &str, channel_id: &str) -> String {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/auth"))
        .json(&serde_json::json!({ "userId": user_id, "channelId": channel_id }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["expiresInSeconds"], 60);
    body["token"].as_str().unwrap().to_string()
}

async fn ws_connect(addr: SocketAddr) -> WsClient {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

async fn recv_frame(client: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(client: &mut WsClient, value: serde_json::Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Run the handshake up to and including `auth_success`.
async fn authenticate(client: &mut WsClient, token: &str) {
    let connected = recv_frame(client).await;
    assert_eq!(connected["type"], "connected");

    send_json(client, serde_json::json!({ "type": "auth", "token": token })).await;
    let frame = recv_frame(client).await;
    assert_eq!(frame["type"], "auth_success", "got {frame}");
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_greets_then_echoes() {
    let agent = Arc::new(EchoAgent::new());
    let (addr, _state) = start_server(test_config(), Arc::clone(&agent) as Arc<dyn AgentService>).await;

    let token = fetch_ticket(addr, "u1", "web-main").await;
    let mut client = ws_connect(addr).await;
    authenticate(&mut client, &token).await;

    let greeting = recv_frame(&mut client).await;
    assert_eq!(greeting["type"], "message");
    assert_eq!(greeting["content"], "Welcome aboard!");

    send_json(
        &mut client,
        serde_json::json!({ "type": "message", "content": "hi", "messageId": "m-1" }),
    )
    .await;
    let reply = recv_frame(&mut client).await;
    assert_eq!(reply["type"], "message");
    assert_eq!(reply["content"], "echo: hi");
    // Configured greeting text never touches the agent.
    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnects_never_repeat_the_greeting() {
    let agent = Arc::new(EchoAgent::new());
    let (addr, _state) = start_server(test_config(), Arc::clone(&agent) as Arc<dyn AgentService>).await;

    // First connection is greeted.
    let token = fetch_ticket(addr, "u-stable", "web-main").await;
    let mut client = ws_connect(addr).await;
    authenticate(&mut client, &token).await;
    let greeting = recv_frame(&mut client).await;
    assert_eq!(greeting["content"], "Welcome aboard!");
    client.close(None).await.unwrap();

    // Ten reconnects with the same derived user id: the first frame after
    // auth is always the echo reply, never a second greeting.
    for n in 0..10 {
        let token = fetch_ticket(addr, "u-stable", "web-main").await;
        let mut client = ws_connect(addr).await;
        authenticate(&mut client, &token).await;

        send_json(
            &mut client,
            serde_json::json!({ "type": "message", "content": "ping", "messageId": format!("m-{n}") }),
        )
        .await;
        let frame = recv_frame(&mut client).await;
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["content"], "echo: ping", "reconnect {n} got {frame}");
        client.close(None).await.unwrap();
    }
}

#[tokio::test]
async fn message_sent_before_greeting_is_not_blocked() {
    // Greeting generation takes 300ms; the user message must be answered
    // without waiting for it.
    let agent = Arc::new(EchoAgent::with_greeting_delay(Duration::from_millis(300)));
    let (addr, _state) = start_server(test_config(), Arc::clone(&agent) as Arc<dyn AgentService>).await;

    let token = fetch_ticket(addr, "u1", "web-quiet").await;
    let mut client = ws_connect(addr).await;
    authenticate(&mut client, &token).await;

    send_json(
        &mut client,
        serde_json::json!({ "type": "message", "content": "hi", "messageId": "m-1" }),
    )
    .await;

    let first = recv_frame(&mut client).await;
    assert_eq!(first["content"], "echo: hi");

    // The greeting still arrives afterwards, best-effort.
    let second = recv_frame(&mut client).await;
    assert_eq!(second["content"], "generated greeting");
}

#[tokio::test]
async fn invalid_ticket_is_terminal_for_the_connection() {
    let (addr, _state) = start_server(test_config(), Arc::new(EchoAgent::new())).await;

    let mut client = ws_connect(addr).await;
    let connected = recv_frame(&mut client).await;
    assert_eq!(connected["type"], "connected");

    send_json(
        &mut client,
        serde_json::json!({ "type": "auth", "token": "deadbeef" }),
    )
    .await;
    let frame = recv_frame(&mut client).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["code"], "AUTH_FAILED");

    // Server closes; no further frames arrive.
    let next = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap();
    assert!(!matches!(next, Some(Ok(Message::Text(_)))));
}

#[tokio::test]
async fn consumed_ticket_cannot_be_replayed() {
    let (addr, _state) = start_server(test_config(), Arc::new(EchoAgent::new())).await;

    let token = fetch_ticket(addr, "u1", "web-main").await;
    let mut first = ws_connect(addr).await;
    authenticate(&mut first, &token).await;

    let mut second = ws_connect(addr).await;
    let connected = recv_frame(&mut second).await;
    assert_eq!(connected["type"], "connected");
    send_json(&mut second, serde_json::json!({ "type": "auth", "token": token })).await;
    let frame = recv_frame(&mut second).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["code"], "AUTH_FAILED");
    assert!(frame["error"]["message"].as_str().unwrap().contains("already used"));
}

#[tokio::test]
async fn message_frame_before_auth_ends_the_handshake() {
    let (addr, _state) = start_server(test_config(), Arc::new(EchoAgent::new())).await;

    let mut client = ws_connect(addr).await;
    let connected = recv_frame(&mut client).await;
    assert_eq!(connected["type"], "connected");

    send_json(
        &mut client,
        serde_json::json!({ "type": "message", "content": "sneaky", "messageId": "m-1" }),
    )
    .await;
    let frame = recv_frame(&mut client).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["code"], "AUTH_FAILED");
}

#[tokio::test]
async fn auth_timeout_closes_the_connection() {
    let mut config = test_config();
    config.session.auth_timeout_secs = 1;
    let (addr, _state) = start_server(config, Arc::new(EchoAgent::new())).await;

    let mut client = ws_connect(addr).await;
    let connected = recv_frame(&mut client).await;
    assert_eq!(connected["type"], "connected");

    // Send nothing; the server must time the handshake out.
    let frame = recv_frame(&mut client).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["code"], "AUTH_TIMEOUT");
}

#[tokio::test]
async fn duplicate_message_id_invokes_agent_once() {
    let agent = Arc::new(EchoAgent::new());
    let (addr, _state) = start_server(test_config(), Arc::clone(&agent) as Arc<dyn AgentService>).await;

    let token = fetch_ticket(addr, "u1", "web-main").await;
    let mut client = ws_connect(addr).await;
    authenticate(&mut client, &token).await;
    let greeting = recv_frame(&mut client).await;
    assert_eq!(greeting["content"], "Welcome aboard!");

    for _ in 0..2 {
        send_json(
            &mut client,
            serde_json::json!({ "type": "message", "content": "hi", "messageId": "dup-1" }),
        )
        .await;
    }

    let first = recv_frame(&mut client).await;
    assert_eq!(first["content"], "echo: hi");
    // The duplicate either re-delivers the cached reply or is dropped while
    // in flight; it must not trigger a second agent invocation.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ticket_issuance_rejects_bad_channels() {
    let (addr, _state) = start_server(test_config(), Arc::new(EchoAgent::new())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/auth"))
        .json(&serde_json::json!({ "userId": "u1", "channelId": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CHANNEL_NOT_FOUND");

    let response = client
        .post(format!("http://{addr}/auth"))
        .json(&serde_json::json!({ "userId": "u1", "channelId": "web-off" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CHANNEL_INACTIVE");
}
