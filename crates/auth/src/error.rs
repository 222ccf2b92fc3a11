/// Crate-wide result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Typed auth errors. Ticket failures are terminal for the connection
/// attempt that presented them; the client must fetch a fresh ticket.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The requested channel id is not configured.
    #[error("unknown channel: {channel_id}")]
    ChannelNotFound { channel_id: String },

    /// The channel exists but is disabled.
    #[error("channel is inactive: {channel_id}")]
    ChannelInactive { channel_id: String },

    /// The ticket's validity window has lapsed before first use.
    #[error("ticket expired")]
    TicketExpired,

    /// The ticket was already consumed by an earlier handshake.
    #[error("ticket already used")]
    TicketAlreadyUsed,

    /// The token matches no issued ticket.
    #[error("invalid ticket")]
    TicketInvalid,
}

impl AuthError {
    #[must_use]
    pub fn channel_not_found(channel_id: impl std::fmt::Display) -> Self {
        Self::ChannelNotFound {
            channel_id: channel_id.to_string(),
        }
    }

    #[must_use]
    pub fn channel_inactive(channel_id: impl std::fmt::Display) -> Self {
        Self::ChannelInactive {
            channel_id: channel_id.to_string(),
        }
    }
}
