//! Telegram Bot API sender.

use {async_trait::async_trait, serde_json::json, tracing::debug};

use crate::{
    error::{Error, Result},
    sender::ChannelSender,
};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Sends text messages through the Telegram Bot API (`sendMessage`).
pub struct TelegramSender {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramSender {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, bot_token)
    }

    pub fn with_api_base(api_base: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            bot_token: bot_token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn kind(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let chat_id: i64 = to
            .parse()
            .map_err(|_| Error::invalid_input(format!("bad chat id: {to}")))?;

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| Error::external("telegram send", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                kind: "telegram".into(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(chat_id, "telegram message delivered");
        Ok(())
    }
}
