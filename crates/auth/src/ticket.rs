use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use {rand::Rng, tokio::sync::Mutex, tracing::debug};

use crate::{
    directory::ChannelDirectory,
    error::{AuthError, Result},
};

/// Identity a consumed ticket resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketClaims {
    pub user_id: String,
    pub channel_id: String,
}

/// What `issue` hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
    pub token: String,
    pub expires_in_seconds: u64,
}

enum TicketState {
    /// Issued, not yet consumed.
    Pending {
        claims: TicketClaims,
        issued_at: Instant,
    },
    /// Consumed once; retained so replays fail with `TicketAlreadyUsed`
    /// instead of `TicketInvalid` until the sweep reaps the marker.
    Consumed { consumed_at: Instant },
}

/// Issues and consumes single-use session tickets.
///
/// Consumption is a single critical section per token: exactly one
/// handshake can win a pending ticket, every later attempt fails
/// deterministically.
pub struct TicketIssuer {
    directory: Arc<ChannelDirectory>,
    ttl: Duration,
    tickets: Mutex<HashMap<String, TicketState>>,
}

impl TicketIssuer {
    pub fn new(directory: Arc<ChannelDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            ttl,
            tickets: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a ticket for `(user_id, channel_id)`.
    ///
    /// Does not create a session; it authorizes the next handshake attempt.
    pub async fn issue(&self, user_id: &str, channel_id: &str) -> Result<IssuedTicket> {
        self.directory.ensure_active(channel_id)?;

        let token = new_token();
        let claims = TicketClaims {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
        };

        let mut tickets = self.tickets.lock().await;
        tickets.insert(token.clone(), TicketState::Pending {
            claims,
            issued_at: Instant::now(),
        });
        debug!(user_id, channel_id, "ticket issued");

        Ok(IssuedTicket {
            token,
            expires_in_seconds: self.ttl.as_secs(),
        })
    }

    /// Consume a ticket, succeeding at most once per token.
    pub async fn consume(&self, token: &str) -> Result<TicketClaims> {
        let mut tickets = self.tickets.lock().await;
        match tickets.get(token) {
            None => Err(AuthError::TicketInvalid),
            Some(TicketState::Consumed { .. }) => Err(AuthError::TicketAlreadyUsed),
            Some(TicketState::Pending { issued_at, .. }) => {
                if issued_at.elapsed() > self.ttl {
                    tickets.remove(token);
                    return Err(AuthError::TicketExpired);
                }
                let claims = match tickets.insert(token.to_string(), TicketState::Consumed {
                    consumed_at: Instant::now(),
                }) {
                    Some(TicketState::Pending { claims, .. }) => claims,
                    // Unreachable: the entry was Pending under this lock.
                    _ => return Err(AuthError::TicketInvalid),
                };
                debug!(user_id = %claims.user_id, channel_id = %claims.channel_id, "ticket consumed");
                Ok(claims)
            },
        }
    }

    /// Drop expired pending tickets and stale consumed markers.
    ///
    /// Consumed markers outlive the TTL by one sweep so replays stay
    /// distinguishable from unknown tokens.
    pub async fn sweep(&self) -> usize {
        let mut tickets = self.tickets.lock().await;
        let before = tickets.len();
        let ttl = self.ttl;
        tickets.retain(|_, state| match state {
            TicketState::Pending { issued_at, .. } => issued_at.elapsed() <= ttl,
            TicketState::Consumed { consumed_at } => consumed_at.elapsed() <= ttl * 2,
        });
        let reaped = before - tickets.len();
        if reaped > 0 {
            debug!(reaped, "swept stale tickets");
        }
        reaped
    }

    /// Number of tracked tickets (pending + consumed markers).
    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
