//! Chat transport protocol definitions.
//!
//! All communication between a chat client and the gateway uses JSON frames
//! over WebSocket:
//! - `ClientFrame` — client → gateway (`auth`, `message`)
//! - `ServerFrame` — gateway → client (`connected`, `auth_success`,
//!   `message`, `error`)
//!
//! Ticket issuance happens out-of-band over HTTP before the socket opens;
//! the request/response bodies for that endpoint live here too so client
//! and server agree on one shape.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB per frame
pub const AUTH_TIMEOUT_MS: u64 = 10_000; // 10s to present a ticket
pub const GREETING_TIMEOUT_MS: u64 = 5_000; // best-effort greeting bound
pub const DISPATCH_TIMEOUT_MS: u64 = 30_000; // per-message reply bound
pub const DEDUPE_WINDOW_MS: u64 = 60_000; // client message id dedup
pub const DEDUPE_MAX_ENTRIES: usize = 1_000;

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const AUTH_TIMEOUT: &str = "AUTH_TIMEOUT";
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    pub const CHANNEL_NOT_FOUND: &str = "CHANNEL_NOT_FOUND";
    pub const CHANNEL_INACTIVE: &str = "CHANNEL_INACTIVE";
    pub const AGENT_UNAVAILABLE: &str = "AGENT_UNAVAILABLE";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const QUEUE_UNKNOWN: &str = "QUEUE_UNKNOWN";
    pub const QUEUE_SATURATED: &str = "QUEUE_SATURATED";
    pub const JOB_EXHAUSTED: &str = "JOB_EXHAUSTED";
    pub const INVALID_FRAME: &str = "INVALID_FRAME";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → gateway frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Present an auth ticket obtained via `POST /auth`.
    Auth { token: String },
    /// A user message. `message_id` is the client-generated id used for
    /// duplicate suppression on retries.
    Message {
        content: String,
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

/// Gateway → client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent immediately after the transport is accepted, before auth.
    Connected,
    /// Auth handshake succeeded; the session is live.
    AuthSuccess {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "channelId")]
        channel_id: String,
    },
    /// An assistant message (greeting or reply).
    Message { content: String, timestamp: u64 },
    /// A non-fatal or fatal error, depending on session state.
    Error { error: ErrorShape },
}

impl ServerFrame {
    pub fn message(content: impl Into<String>, timestamp: u64) -> Self {
        Self::Message {
            content: content.into(),
            timestamp,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorShape::new(code, message),
        }
    }
}

// ── Close reasons ────────────────────────────────────────────────────────────

/// Why the gateway closed a connection during or after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// No `auth` frame arrived within the handshake window.
    AuthTimeout,
    /// The presented ticket was invalid, expired, or already used.
    AuthFailed,
    /// The peer closed the transport or the read side errored.
    Transport,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthTimeout => "auth_timeout",
            Self::AuthFailed => "auth_failed",
            Self::Transport => "transport",
        }
    }
}

// ── Ticket issuance (HTTP) ───────────────────────────────────────────────────

/// Body of `POST /auth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "channelId")]
    pub channel_id: String,
}

/// Successful response of `POST /auth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub token: String,
    #[serde(rename = "expiresInSeconds")]
    pub expires_in_seconds: u64,
}
