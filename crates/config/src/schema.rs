//! Typed configuration schema with serde defaults.
//!
//! Every field has a default so a missing config file yields a runnable
//! gateway bound to localhost with no channels configured.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Root ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvoyConfig {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub queue: QueueConfig,
    /// Configured chat channels. Ticket issuance validates against this set.
    pub channels: Vec<ChannelConfig>,
}

// ── Gateway ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8790,
        }
    }
}

// ── Auth ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long an issued ticket stays valid before first use.
    pub ticket_ttl_secs: u64,
    /// Interval of the background sweep that reaps expired tickets.
    pub sweep_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            ticket_ttl_secs: 60,
            sweep_interval_secs: 30,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a new connection may idle before presenting an auth ticket.
    pub auth_timeout_secs: u64,
    /// Best-effort bound on greeting generation; timeout logs a warning.
    pub greeting_timeout_secs: u64,
    /// Bound on a single message dispatch before an error frame is emitted.
    pub dispatch_timeout_secs: u64,
    /// Window within which a repeated client message id is a duplicate.
    pub dedupe_window_secs: u64,
    /// Window within which reconnects continue the same conversation
    /// (and therefore receive no second greeting).
    pub conversation_window_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_timeout_secs: 10,
            greeting_timeout_secs: 5,
            dispatch_timeout_secs: 30,
            dedupe_window_secs: 60,
            conversation_window_secs: 1_800,
        }
    }
}

// ── Queues ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// First retry delay; doubles per attempt up to `backoff_cap_ms`.
    pub base_backoff_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_attempts: u32,
    /// Worker tasks per handled queue.
    pub workers: usize,
    /// Enqueue is rejected once a queue holds this many waiting jobs.
    pub max_waiting: usize,
    /// Per-queue overrides, keyed by queue name.
    pub overrides: HashMap<String, QueueOverride>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 1_000,
            backoff_cap_ms: 60_000,
            max_attempts: 3,
            workers: 1,
            max_waiting: 10_000,
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOverride {
    pub base_backoff_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub workers: Option<usize>,
    pub max_waiting: Option<usize>,
}

/// Effective settings for one queue after applying its override.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedQueueConfig {
    pub base_backoff_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_attempts: u32,
    pub workers: usize,
    pub max_waiting: usize,
}

impl QueueConfig {
    /// Resolve the settings for `queue`, falling back to globals.
    pub fn resolve(&self, queue: &str) -> ResolvedQueueConfig {
        let o = self.overrides.get(queue);
        ResolvedQueueConfig {
            base_backoff_ms: o
                .and_then(|o| o.base_backoff_ms)
                .unwrap_or(self.base_backoff_ms),
            backoff_cap_ms: o
                .and_then(|o| o.backoff_cap_ms)
                .unwrap_or(self.backoff_cap_ms),
            max_attempts: o.and_then(|o| o.max_attempts).unwrap_or(self.max_attempts),
            workers: o.and_then(|o| o.workers).unwrap_or(self.workers),
            max_waiting: o.and_then(|o| o.max_waiting).unwrap_or(self.max_waiting),
        }
    }
}

// ── Channels ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Web,
    Whatsapp,
    Telegram,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
            Self::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Fixed greeting text. When absent the agent generates the greeting.
    #[serde(default)]
    pub greeting: Option<String>,
}

fn default_true() -> bool {
    true
}
