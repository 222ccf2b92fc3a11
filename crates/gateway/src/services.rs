//! Trait interfaces for the collaborators the gateway delegates to.
//! Each trait has a `Noop` implementation so the gateway runs standalone
//! before a real provider is wired in.

use async_trait::async_trait;

// ── Agent ────────────────────────────────────────────────────────────────────

/// Token accounting reported by the agent backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// What the agent produced for one turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// Input to one agent turn. `content` is `None` when the gateway asks for a
/// conversation-opening greeting.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub user_id: String,
    pub channel_id: String,
    pub content: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited")]
    RateLimited,

    #[error("agent error: {0}")]
    Internal(String),
}

/// Opaque reply generation. The model call, prompt assembly, and tool use
/// all live behind this seam.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn generate_reply(&self, ctx: AgentContext) -> Result<AgentReply, AgentError>;
}

/// Fixed-text agent, used until a provider is configured.
pub struct NoopAgentService;

#[async_trait]
impl AgentService for NoopAgentService {
    async fn generate_reply(&self, ctx: AgentContext) -> Result<AgentReply, AgentError> {
        let text = match ctx.content {
            Some(_) => "No agent backend is configured yet.".to_string(),
            None => "Hello! How can I help you today?".to_string(),
        };
        Ok(AgentReply {
            text,
            usage: TokenUsage::default(),
        })
    }
}

// ── Embeddings ───────────────────────────────────────────────────────────────

/// Document chunking + embedding pipeline, consumed by the
/// `document-processing` queue handler. Returns the number of chunks
/// indexed.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_document(&self, document_id: &str, content: &str) -> anyhow::Result<usize>;
}

pub struct NoopEmbeddingService;

#[async_trait]
impl EmbeddingService for NoopEmbeddingService {
    async fn embed_document(&self, _document_id: &str, _content: &str) -> anyhow::Result<usize> {
        Ok(0)
    }
}
