use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Push a text message to a recipient on one messaging platform.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Channel kind identifier (e.g. "whatsapp", "telegram", "email").
    fn kind(&self) -> &str;

    /// Deliver `text` to `to` (platform-specific recipient id).
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;
}

/// Registry of all configured senders, keyed by channel kind.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.kind().to_string(), sender);
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn ChannelSender>> {
        self.senders
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::unknown_kind(kind))
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.senders.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::recording::RecordingSender};

    #[tokio::test]
    async fn registry_routes_by_kind() {
        let mut registry = SenderRegistry::new();
        registry.register(Arc::new(RecordingSender::new("whatsapp")));

        let sender = registry.get("whatsapp").unwrap();
        sender.send_text("+155500", "hello").await.unwrap();
        assert!(matches!(
            registry.get("telegram"),
            Err(Error::UnknownKind { .. })
        ));
    }
}
