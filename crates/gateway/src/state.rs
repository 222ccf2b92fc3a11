use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use {
    tokio::sync::{Mutex, RwLock, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use {
    convoy_auth::{ChannelDirectory, TicketIssuer},
    convoy_config::SessionConfig,
    convoy_protocol::ServerFrame,
    convoy_queue::QueueManager,
};

use crate::dispatch::MessageDispatcher;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Session settings ─────────────────────────────────────────────────────────

/// Session-layer timeouts, resolved from config once at startup.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub auth_timeout: Duration,
    pub greeting_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub dedupe_window: Duration,
    pub conversation_window: Duration,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            auth_timeout: Duration::from_secs(cfg.auth_timeout_secs),
            greeting_timeout: Duration::from_secs(cfg.greeting_timeout_secs),
            dispatch_timeout: Duration::from_secs(cfg.dispatch_timeout_secs),
            dedupe_window: Duration::from_secs(cfg.dedupe_window_secs),
            conversation_window: Duration::from_secs(cfg.conversation_window_secs),
        }
    }
}

// ── Connected session ────────────────────────────────────────────────────────

/// One authenticated WebSocket connection.
#[derive(Debug)]
pub struct ConnectedSession {
    pub session_id: String,
    pub user_id: String,
    pub channel_id: String,
    /// Channel for sending serialized frames to this session's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
    pub last_seen: Instant,
    /// Fired on close so in-flight dispatches are dropped, not delivered.
    pub cancel: CancellationToken,
}

impl ConnectedSession {
    /// Send a frame to this session. Returns false when the write loop is
    /// gone.
    pub fn send(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.sender.send(json).is_ok(),
            Err(_) => false,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

// ── Greeting ledger ──────────────────────────────────────────────────────────

/// Tracks which `(user_id, channel_id)` conversations have been greeted.
///
/// Entries expire after the conversation window, so a user returning much
/// later starts a fresh conversation and is greeted again. Reconnects
/// inside the window never produce a second greeting.
pub struct GreetingLedger {
    entries: HashMap<(String, String), Instant>,
    window: Duration,
}

impl GreetingLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
        }
    }

    /// Returns true exactly once per conversation window; the caller that
    /// wins the claim is responsible for delivering the greeting.
    pub fn claim(&mut self, user_id: &str, channel_id: &str) -> bool {
        let window = self.window;
        self.entries.retain(|_, at| at.elapsed() <= window);

        let key = (user_id.to_string(), channel_id.to_string());
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Instant::now());
        true
    }
}

// ── Dedupe cache ─────────────────────────────────────────────────────────────

/// Cached outcome of a dispatched client message id.
#[derive(Debug, Clone)]
pub enum DedupeOutcome {
    /// First sighting; the caller should invoke the agent.
    Fresh,
    /// The original dispatch is still running; drop the duplicate.
    InFlight,
    /// The original completed; re-deliver its reply.
    Cached { content: String, timestamp_ms: u64 },
}

enum DedupeEntry {
    InFlight {
        inserted_at: Instant,
    },
    Done {
        inserted_at: Instant,
        content: String,
        timestamp_ms: u64,
    },
}

impl DedupeEntry {
    fn inserted_at(&self) -> Instant {
        match self {
            Self::InFlight { inserted_at } | Self::Done { inserted_at, .. } => *inserted_at,
        }
    }
}

/// TTL-bounded idempotency cache for client message ids.
pub struct DedupeCache {
    entries: HashMap<String, DedupeEntry>,
    window: Duration,
    max_entries: usize,
}

impl DedupeCache {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            max_entries: convoy_protocol::DEDUPE_MAX_ENTRIES,
        }
    }

    /// Record a sighting of `key` and report how to proceed.
    pub fn begin(&mut self, key: &str) -> DedupeOutcome {
        self.evict_expired();
        match self.entries.get(key) {
            Some(DedupeEntry::InFlight { .. }) => return DedupeOutcome::InFlight,
            Some(DedupeEntry::Done {
                content,
                timestamp_ms,
                ..
            }) => {
                return DedupeOutcome::Cached {
                    content: content.clone(),
                    timestamp_ms: *timestamp_ms,
                };
            },
            None => {},
        }

        if self.entries.len() >= self.max_entries
            && let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at())
                .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }

        self.entries.insert(key.to_string(), DedupeEntry::InFlight {
            inserted_at: Instant::now(),
        });
        DedupeOutcome::Fresh
    }

    /// Store the reply for a completed dispatch.
    pub fn store(&mut self, key: &str, content: String, timestamp_ms: u64) {
        self.entries.insert(key.to_string(), DedupeEntry::Done {
            inserted_at: Instant::now(),
            content,
            timestamp_ms,
        });
    }

    /// Drop an in-flight marker (failed or abandoned dispatch) so the
    /// client's retry is not swallowed.
    pub fn forget(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn evict_expired(&mut self) {
        let window = self.window;
        self.entries.retain(|_, e| e.inserted_at().elapsed() <= window);
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across tasks.
pub struct GatewayState {
    /// All authenticated sessions, keyed by session id.
    pub sessions: RwLock<HashMap<String, ConnectedSession>>,
    greetings: Mutex<GreetingLedger>,
    pub directory: Arc<ChannelDirectory>,
    pub tickets: Arc<TicketIssuer>,
    pub queue: Arc<QueueManager>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub settings: SessionSettings,
    pub version: String,
}

impl GatewayState {
    pub fn new(
        directory: Arc<ChannelDirectory>,
        tickets: Arc<TicketIssuer>,
        queue: Arc<QueueManager>,
        dispatcher: Arc<MessageDispatcher>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            greetings: Mutex::new(GreetingLedger::new(settings.conversation_window)),
            directory,
            tickets,
            queue,
            dispatcher,
            settings,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Register a newly authenticated session.
    pub async fn register_session(&self, session: ConnectedSession) {
        let session_id = session.session_id.clone();
        self.sessions.write().await.insert(session_id, session);
    }

    /// Remove a session and fire its cancellation token.
    pub async fn remove_session(&self, session_id: &str) -> Option<ConnectedSession> {
        let removed = self.sessions.write().await.remove(session_id);
        if let Some(ref session) = removed {
            session.cancel.cancel();
            debug!(session_id, "session removed from registry");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn touch_session(&self, session_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.touch();
        }
    }

    /// Send a frame to a live session. Returns false if it is gone.
    pub async fn send_to(&self, session_id: &str, frame: &ServerFrame) -> bool {
        match self.sessions.read().await.get(session_id) {
            Some(session) => session.send(frame),
            None => false,
        }
    }

    /// Claim the right to greet this conversation.
    pub async fn claim_greeting(&self, user_id: &str, channel_id: &str) -> bool {
        self.greetings.lock().await.claim(user_id, channel_id)
    }
}
