//! Outbound channel delivery adapters.
//!
//! Each messaging platform gets a [`ChannelSender`] implementation that
//! pushes text to a recipient through the platform's HTTP API. Senders are
//! looked up by channel kind in a [`SenderRegistry`]; queue workers use them
//! to deliver assistant replies asynchronously.

pub mod email;
pub mod error;
pub mod recording;
pub mod sender;
pub mod telegram;
pub mod whatsapp;

pub use {
    email::EmailSender,
    error::{Error, Result},
    recording::RecordingSender,
    sender::{ChannelSender, SenderRegistry},
    telegram::TelegramSender,
    whatsapp::WhatsAppSender,
};
