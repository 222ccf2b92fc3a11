//! Auth handshake service: channel directory lookups and single-use,
//! short-lived session tickets.
//!
//! A client fetches a ticket over HTTP (`POST /auth`) before opening the
//! WebSocket, then presents it in the first frame. Issuance never creates a
//! session; it only authorizes the next handshake attempt.

pub mod directory;
pub mod error;
pub mod ticket;

pub use {
    directory::{ChannelDirectory, ChannelEntry},
    error::{AuthError, Result},
    ticket::{IssuedTicket, TicketClaims, TicketIssuer},
};
