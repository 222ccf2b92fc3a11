//! WhatsApp Cloud API sender.

use {async_trait::async_trait, serde_json::json, tracing::debug};

use crate::{
    error::{Error, Result},
    sender::ChannelSender,
};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Sends text messages through the WhatsApp Cloud API
/// (`POST /{phone_number_id}/messages`).
pub struct WhatsAppSender {
    http: reqwest::Client,
    api_base: String,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppSender {
    pub fn new(phone_number_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, phone_number_id, access_token)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }
}

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn kind(&self) -> &str {
        "whatsapp"
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        if to.is_empty() {
            return Err(Error::invalid_input("empty recipient"));
        }

        let body = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text },
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::external("whatsapp send", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                kind: "whatsapp".into(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(to, "whatsapp message delivered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posts_to_messages_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/12345/messages")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"messages":[{"id":"wamid.1"}]}"#)
            .create_async()
            .await;

        let sender = WhatsAppSender::with_api_base(server.url(), "12345", "tok");
        sender.send_text("+15551234", "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/12345/messages")
            .with_status(401)
            .with_body(r#"{"error":"bad token"}"#)
            .create_async()
            .await;

        let sender = WhatsAppSender::with_api_base(server.url(), "12345", "tok");
        let err = sender.send_text("+15551234", "hello").await.unwrap_err();
        assert!(matches!(err, Error::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn empty_recipient_is_invalid() {
        let sender = WhatsAppSender::new("12345", "tok");
        assert!(matches!(
            sender.send_text("", "hello").await,
            Err(Error::InvalidInput { .. })
        ));
    }
}
