#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the queue observability API and the job pipeline
//! behind it.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {async_trait::async_trait, tokio::net::TcpListener};

use {
    convoy_channels::{ChannelSender, RecordingSender, SenderRegistry},
    convoy_config::{ChannelConfig, ChannelKind, ConvoyConfig, QueueOverride},
    convoy_gateway::{
        server::{AppState, build_gateway_app, build_runtime},
        services::{
            AgentContext, AgentError, AgentReply, AgentService, EmbeddingService, TokenUsage,
        },
    },
    convoy_queue::EnqueueOptions,
};

// ── Test collaborators ───────────────────────────────────────────────────────

struct EchoAgent;

#[async_trait]
impl AgentService for EchoAgent {
    async fn generate_reply(&self, ctx: AgentContext) -> Result<AgentReply, AgentError> {
        Ok(AgentReply {
            text: format!("echo: {}", ctx.content.unwrap_or_default()),
            usage: TokenUsage::default(),
        })
    }
}

/// Embedding service that always fails (drives the retry/exhaustion path)
/// or stalls (drives the reset-with-active-job path).
struct FlakyEmbedding {
    stall: Duration,
    fail: bool,
}

#[async_trait]
impl EmbeddingService for FlakyEmbedding {
    async fn embed_document(&self, _document_id: &str, _content: &str) -> anyhow::Result<usize> {
        tokio::time::sleep(self.stall).await;
        if self.fail {
            anyhow::bail!("embedding backend unreachable");
        }
        Ok(3)
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

fn test_config() -> ConvoyConfig {
    let mut config = ConvoyConfig::default();
    config.channels = vec![ChannelConfig {
        id: "wa-1".into(),
        name: "WhatsApp".into(),
        kind: ChannelKind::Whatsapp,
        active: true,
        greeting: None,
    }];
    // Fast retries so exhaustion tests finish quickly.
    config.queue.overrides.insert("document-processing".into(), QueueOverride {
        base_backoff_ms: Some(5),
        backoff_cap_ms: Some(20),
        ..Default::default()
    });
    config
}

async fn start_server(
    config: ConvoyConfig,
    embedding: Arc<dyn EmbeddingService>,
    senders: Arc<SenderRegistry>,
) -> (SocketAddr, AppState) {
    let app_state = build_runtime(&config, Arc::new(EchoAgent), embedding, senders)
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

async fn fetch_stats(addr: SocketAddr) -> serde_json::Value {
    reqwest::get(format!("http://{addr}/api/queues"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for<F>(addr: SocketAddr, mut predicate: F) -> serde_json::Value
where
    F: FnMut(&serde_json::Value) -> bool,
{
    for _ in 0..200 {
        let stats = fetch_stats(addr).await;
        if predicate(&stats) {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue stats never reached the expected shape");
}

fn noop_embedding() -> Arc<dyn EmbeddingService> {
    Arc::new(FlakyEmbedding {
        stall: Duration::ZERO,
        fail: false,
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_report_every_registered_queue_as_handled() {
    let (addr, _state) =
        start_server(test_config(), noop_embedding(), Arc::new(SenderRegistry::new())).await;

    let stats = fetch_stats(addr).await;
    assert_eq!(stats["healthy"], true);
    let queues = stats["queues"].as_object().unwrap();
    assert_eq!(queues.len(), convoy_queue::REGISTERED_QUEUES.len());
    assert!(queues.values().all(|v| v.as_bool() == Some(true)));
    assert!(stats["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn completed_jobs_show_up_in_stats() {
    let (addr, state) =
        start_server(test_config(), noop_embedding(), Arc::new(SenderRegistry::new())).await;

    state
        .gateway
        .queue
        .enqueue(
            "analytics",
            serde_json::json!({ "event": "test" }),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    let stats = wait_for(addr, |s| {
        s["stats"]["analytics"]["completed"].as_u64() == Some(1)
    })
    .await;
    assert_eq!(stats["stats"]["analytics"]["total"], 1);
}

#[tokio::test]
async fn exhausted_document_job_lands_in_failed() {
    let embedding = Arc::new(FlakyEmbedding {
        stall: Duration::ZERO,
        fail: true,
    });
    let (addr, state) =
        start_server(test_config(), embedding, Arc::new(SenderRegistry::new())).await;

    let job_id = state
        .gateway
        .queue
        .enqueue(
            "document-processing",
            serde_json::json!({ "documentId": "d1", "content": "text to index" }),
            EnqueueOptions {
                max_attempts: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    wait_for(addr, |s| {
        s["stats"]["document-processing"]["failed"].as_u64() == Some(1)
    })
    .await;

    let job = state.gateway.queue.get(&job_id).await.unwrap();
    assert_eq!(job.attempts_made, 3);
    assert!(
        job.failure_reason
            .as_deref()
            .unwrap()
            .contains("unreachable")
    );
}

#[tokio::test]
async fn reset_clears_terminal_jobs_but_not_active_ones() {
    let embedding = Arc::new(FlakyEmbedding {
        stall: Duration::from_secs(2),
        fail: false,
    });
    let (addr, state) =
        start_server(test_config(), embedding, Arc::new(SenderRegistry::new())).await;
    let queue = Arc::clone(&state.gateway.queue);

    // One fast job that completes…
    queue
        .enqueue(
            "analytics",
            serde_json::json!({ "event": "done" }),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    wait_for(addr, |s| {
        s["stats"]["analytics"]["completed"].as_u64() == Some(1)
    })
    .await;

    // …and one slow job that is Active while we reset.
    queue
        .enqueue(
            "document-processing",
            serde_json::json!({ "documentId": "slow", "content": "..." }),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    wait_for(addr, |s| {
        s["stats"]["document-processing"]["active"].as_u64() == Some(1)
    })
    .await;

    let response: serde_json::Value = reqwest::Client::new()
        .post(format!("http://{addr}/api/queues/reset"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["reset"], true);
    assert_eq!(response["cleared"], 1);

    let stats = fetch_stats(addr).await;
    assert_eq!(stats["stats"]["analytics"]["completed"], 0);
    assert_eq!(stats["stats"]["document-processing"]["active"], 1);
}

#[tokio::test]
async fn inbound_channel_message_round_trips_to_delivery() {
    // A message arriving via the message-processing queue (channel webhook
    // path) gets dispatched and its reply delivered through the WhatsApp
    // sender.
    let recorder = Arc::new(RecordingSender::new("whatsapp"));
    let mut registry = SenderRegistry::new();
    registry.register(Arc::clone(&recorder) as Arc<dyn ChannelSender>);

    let (addr, state) = start_server(test_config(), noop_embedding(), Arc::new(registry)).await;

    state
        .gateway
        .queue
        .enqueue(
            "message-processing",
            serde_json::json!({
                "userId": "+15551234",
                "channelId": "wa-1",
                "content": "hola",
                "messageId": "wamid.1",
            }),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    wait_for(addr, |s| {
        s["stats"]["whatsapp-sending"]["completed"].as_u64() == Some(1)
    })
    .await;

    assert_eq!(
        recorder.sent().await,
        vec![("+15551234".to_string(), "echo: hola".to_string())]
    );
}
