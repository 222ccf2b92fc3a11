use {async_trait::async_trait, tokio::sync::Mutex};

use crate::{error::Result, sender::ChannelSender};

/// In-memory sender that records every delivery. Used by tests and by the
/// gateway's dry-run wiring when a platform has no credentials configured.
pub struct RecordingSender {
    kind: String,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of `(to, text)` pairs delivered so far.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((to.to_string(), text.to_string()));
        Ok(())
    }
}
