//! Message dispatch: idempotent routing of session messages to the agent,
//! plus the background jobs a reply fans out into.

use std::sync::Arc;

use {
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

use {
    convoy_auth::ChannelDirectory,
    convoy_config::ChannelKind,
    convoy_queue::{EnqueueOptions, QueueManager},
};

use crate::{
    services::{AgentContext, AgentError, AgentService},
    state::{DedupeCache, DedupeOutcome, now_ms},
};

// ── Types ────────────────────────────────────────────────────────────────────

/// A reply ready to be framed back to the session.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub content: String,
    pub timestamp_ms: u64,
}

/// What one dispatch call produced.
#[derive(Debug)]
pub enum DispatchOutcome {
    Reply(AssistantReply),
    /// The same client message id is still being processed; nothing to send.
    DuplicateDropped,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("rate limited")]
    RateLimited,

    #[error("dispatch failed: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Wire error code for the session `error` frame.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentUnavailable(_) => convoy_protocol::error_codes::AGENT_UNAVAILABLE,
            Self::RateLimited => convoy_protocol::error_codes::RATE_LIMITED,
            Self::Internal(_) => convoy_protocol::error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<AgentError> for DispatchError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Unavailable(m) => Self::AgentUnavailable(m),
            AgentError::RateLimited => Self::RateLimited,
            AgentError::Internal(m) => Self::Internal(m),
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Routes inbound messages to the agent and enqueues the follow-up work a
/// reply depends on. Duplicate client message ids within the dedupe window
/// trigger at most one agent invocation.
pub struct MessageDispatcher {
    agent: Arc<dyn AgentService>,
    queue: Arc<QueueManager>,
    directory: Arc<ChannelDirectory>,
    dedupe: Mutex<DedupeCache>,
}

impl MessageDispatcher {
    pub fn new(
        agent: Arc<dyn AgentService>,
        queue: Arc<QueueManager>,
        directory: Arc<ChannelDirectory>,
        dedupe_window: std::time::Duration,
    ) -> Self {
        Self {
            agent,
            queue,
            directory,
            dedupe: Mutex::new(DedupeCache::new(dedupe_window)),
        }
    }

    /// Dispatch one user message.
    pub async fn dispatch(
        &self,
        session_id: &str,
        user_id: &str,
        channel_id: &str,
        content: &str,
        client_message_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let key = dedupe_key(session_id, client_message_id);
        match self.dedupe.lock().await.begin(&key) {
            DedupeOutcome::Cached {
                content,
                timestamp_ms,
            } => {
                debug!(session_id, client_message_id, "returning cached reply for duplicate");
                return Ok(DispatchOutcome::Reply(AssistantReply {
                    content,
                    timestamp_ms,
                }));
            },
            DedupeOutcome::InFlight => {
                debug!(session_id, client_message_id, "dropping duplicate in-flight message");
                return Ok(DispatchOutcome::DuplicateDropped);
            },
            DedupeOutcome::Fresh => {},
        }

        let reply = match self
            .agent
            .generate_reply(AgentContext {
                user_id: user_id.to_string(),
                channel_id: channel_id.to_string(),
                content: Some(content.to_string()),
            })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // Let the client retry the same message id after a failure.
                self.dedupe.lock().await.forget(&key);
                return Err(e.into());
            },
        };

        let timestamp_ms = now_ms();
        self.dedupe
            .lock()
            .await
            .store(&key, reply.text.clone(), timestamp_ms);

        self.enqueue_side_effects(user_id, channel_id, &reply.text, &reply.usage)
            .await;

        Ok(DispatchOutcome::Reply(AssistantReply {
            content: reply.text,
            timestamp_ms,
        }))
    }

    /// Produce the conversation-opening greeting: configured channel text
    /// when present, otherwise one agent turn with no user content.
    pub async fn greeting(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<AssistantReply, DispatchError> {
        if let Some(entry) = self.directory.get(channel_id)
            && let Some(ref text) = entry.greeting
        {
            return Ok(AssistantReply {
                content: text.clone(),
                timestamp_ms: now_ms(),
            });
        }

        let reply = self
            .agent
            .generate_reply(AgentContext {
                user_id: user_id.to_string(),
                channel_id: channel_id.to_string(),
                content: None,
            })
            .await?;
        Ok(AssistantReply {
            content: reply.text,
            timestamp_ms: now_ms(),
        })
    }

    /// Drop the in-flight dedupe marker for a dispatch the session layer
    /// gave up on (timeout), so a client retry is processed.
    pub async fn abandon(&self, session_id: &str, client_message_id: &str) {
        self.dedupe
            .lock()
            .await
            .forget(&dedupe_key(session_id, client_message_id));
    }

    /// Fan a reply out into background work. Enqueue failures are logged,
    /// never surfaced to the session: delivery retries belong to the queue
    /// layer, and the socket reply already carries the content.
    async fn enqueue_side_effects(
        &self,
        user_id: &str,
        channel_id: &str,
        reply_text: &str,
        usage: &crate::services::TokenUsage,
    ) {
        let kind = self.directory.get(channel_id).map(|e| e.kind);

        let delivery_queue = match kind {
            Some(ChannelKind::Whatsapp) => Some("whatsapp-sending"),
            Some(ChannelKind::Telegram) => Some("telegram-sending"),
            Some(ChannelKind::Email) => Some("email-sending"),
            // Web replies travel back over the socket only.
            Some(ChannelKind::Web) | None => None,
        };

        if let Some(queue) = delivery_queue {
            let payload = serde_json::json!({
                "to": user_id,
                "text": reply_text,
            });
            if let Err(e) = self
                .queue
                .enqueue(queue, payload, EnqueueOptions::default())
                .await
            {
                warn!(queue, error = %e, "failed to enqueue delivery job");
            }
        }

        let analytics = serde_json::json!({
            "userId": user_id,
            "channelId": channel_id,
            "inputTokens": usage.input_tokens,
            "outputTokens": usage.output_tokens,
            "ts": now_ms(),
        });
        if let Err(e) = self
            .queue
            .enqueue("analytics", analytics, EnqueueOptions::default())
            .await
        {
            warn!(error = %e, "failed to enqueue analytics job");
        }
    }
}

fn dedupe_key(session_id: &str, client_message_id: &str) -> String {
    format!("{session_id}:{client_message_id}")
}
