//! Job handlers: what each background queue actually does, and the wiring
//! that attaches them to worker pools at startup.

use std::sync::Arc;

use {
    anyhow::Context,
    async_trait::async_trait,
    tracing::{debug, info},
};

use {
    convoy_channels::SenderRegistry,
    convoy_config::QueueConfig,
    convoy_queue::{Job, JobHandler, WorkerPool},
};

use crate::{
    dispatch::{DispatchOutcome, MessageDispatcher},
    services::EmbeddingService,
};

fn str_field<'a>(job: &'a Job, key: &str) -> anyhow::Result<&'a str> {
    job.payload
        .get(key)
        .and_then(|v| v.as_str())
        .with_context(|| format!("payload missing '{key}'"))
}

// ── Channel delivery ─────────────────────────────────────────────────────────

/// Delivers `{to, text}` payloads through one channel sender.
pub struct ChannelDeliveryHandler {
    kind: String,
    senders: Arc<SenderRegistry>,
}

impl ChannelDeliveryHandler {
    pub fn new(kind: impl Into<String>, senders: Arc<SenderRegistry>) -> Self {
        Self {
            kind: kind.into(),
            senders,
        }
    }
}

#[async_trait]
impl JobHandler for ChannelDeliveryHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let to = str_field(job, "to")?;
        let text = str_field(job, "text")?;

        let sender = self.senders.get(&self.kind)?;
        sender.send_text(to, text).await?;
        debug!(kind = %self.kind, to, "delivery job done");
        Ok(serde_json::json!({ "delivered": to }))
    }
}

// ── Webhook delivery ─────────────────────────────────────────────────────────

/// POSTs `{url, body}` payloads to external endpoints (tool callbacks).
pub struct WebhookDeliveryHandler {
    http: reqwest::Client,
}

impl WebhookDeliveryHandler {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookDeliveryHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for WebhookDeliveryHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let url = str_field(job, "url")?;
        let body = job
            .payload
            .get("body")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("webhook POST {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("webhook {url} answered {status}");
        }
        debug!(url, status = status.as_u16(), "webhook delivered");
        Ok(serde_json::json!({ "status": status.as_u16() }))
    }
}

// ── Document embedding ───────────────────────────────────────────────────────

/// Feeds `{documentId, content}` payloads into the embedding pipeline.
pub struct DocumentEmbedHandler {
    embedding: Arc<dyn EmbeddingService>,
}

impl DocumentEmbedHandler {
    pub fn new(embedding: Arc<dyn EmbeddingService>) -> Self {
        Self { embedding }
    }
}

#[async_trait]
impl JobHandler for DocumentEmbedHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let document_id = str_field(job, "documentId")?;
        let content = str_field(job, "content")?;

        let chunks = self.embedding.embed_document(document_id, content).await?;
        debug!(document_id, chunks, "document embedded");
        Ok(serde_json::json!({ "chunks": chunks }))
    }
}

// ── Event recording ──────────────────────────────────────────────────────────

/// Terminal sink for `analytics` and `notifications` payloads: records the
/// event in the structured log for downstream collectors to scrape.
pub struct EventLogHandler {
    stream: String,
}

impl EventLogHandler {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
        }
    }
}

#[async_trait]
impl JobHandler for EventLogHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        info!(stream = %self.stream, payload = %job.payload, "event recorded");
        Ok(serde_json::json!({ "recorded": true }))
    }
}

// ── Inbound channel messages ─────────────────────────────────────────────────

/// Processes messages that arrived through channel webhooks rather than a
/// live socket: runs one dispatch turn. The reply is delivered back to the
/// channel by the dispatcher's own delivery-job fan-out.
pub struct InboundMessageHandler {
    dispatcher: Arc<MessageDispatcher>,
}

impl InboundMessageHandler {
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl JobHandler for InboundMessageHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let user_id = str_field(job, "userId")?;
        let channel_id = str_field(job, "channelId")?;
        let content = str_field(job, "content")?;
        let message_id = str_field(job, "messageId")?;

        // Channel conversations have no socket session; the synthetic id
        // keeps dedup stable across job retries.
        let session_id = format!("channel:{channel_id}:{user_id}");
        let outcome = self
            .dispatcher
            .dispatch(&session_id, user_id, channel_id, content, message_id)
            .await?;

        Ok(match outcome {
            DispatchOutcome::Reply(reply) => {
                serde_json::json!({ "replied": true, "chars": reply.content.len() })
            },
            DispatchOutcome::DuplicateDropped => serde_json::json!({ "duplicate": true }),
        })
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

/// Attach the standard handler set to the worker pool, one pool of
/// `workers` tasks per queue as resolved from config.
pub async fn register_default_handlers(
    pool: &WorkerPool,
    queue_cfg: &QueueConfig,
    dispatcher: Arc<MessageDispatcher>,
    senders: Arc<SenderRegistry>,
    embedding: Arc<dyn EmbeddingService>,
) -> convoy_queue::Result<()> {
    let workers = |name: &str| queue_cfg.resolve(name).workers;

    for kind in ["whatsapp", "telegram", "email"] {
        let queue = format!("{kind}-sending");
        pool.start(
            &queue,
            Arc::new(ChannelDeliveryHandler::new(kind, Arc::clone(&senders))),
            workers(&queue),
        )
        .await?;
    }

    pool.start(
        "webhook-processing",
        Arc::new(WebhookDeliveryHandler::new()),
        workers("webhook-processing"),
    )
    .await?;

    pool.start(
        "document-processing",
        Arc::new(DocumentEmbedHandler::new(embedding)),
        workers("document-processing"),
    )
    .await?;

    pool.start(
        "message-processing",
        Arc::new(InboundMessageHandler::new(dispatcher)),
        workers("message-processing"),
    )
    .await?;

    for stream in ["analytics", "notifications"] {
        pool.start(
            stream,
            Arc::new(EventLogHandler::new(stream)),
            workers(stream),
        )
        .await?;
    }

    Ok(())
}
