//! Email delivery through a REST relay (any provider with a JSON send API).

use {async_trait::async_trait, serde_json::json, tracing::debug};

use crate::{
    error::{Error, Result},
    sender::ChannelSender,
};

/// Sends email through an HTTP relay endpoint.
pub struct EmailSender {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailSender {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn kind(&self) -> &str {
        "email"
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        if !to.contains('@') {
            return Err(Error::invalid_input(format!("bad email address: {to}")));
        }

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": to,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| Error::external("email send", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                kind: "email".into(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(to, "email delivered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posts_relay_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .match_header("authorization", "Bearer key")
            .with_status(202)
            .create_async()
            .await;

        let sender = EmailSender::new(format!("{}/send", server.url()), "key", "bot@example.com");
        sender.send_text("user@example.com", "hi").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn address_without_at_is_invalid() {
        let sender = EmailSender::new("http://localhost/send", "key", "bot@example.com");
        assert!(matches!(
            sender.send_text("nope", "hi").await,
            Err(Error::InvalidInput { .. })
        ));
    }
}
