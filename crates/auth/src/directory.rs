use std::collections::HashMap;

use convoy_config::{ChannelConfig, ChannelKind};

use crate::error::{AuthError, Result};

/// One configured channel, as seen by the auth and dispatch layers.
#[derive(Debug, Clone)]
pub struct ChannelEntry {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub active: bool,
    pub greeting: Option<String>,
}

/// Read-only lookup of configured channels.
///
/// Built once at startup from config; channel CRUD is an external concern.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    channels: HashMap<String, ChannelEntry>,
}

impl ChannelDirectory {
    pub fn from_config(channels: &[ChannelConfig]) -> Self {
        let channels = channels
            .iter()
            .map(|c| {
                (c.id.clone(), ChannelEntry {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    kind: c.kind,
                    active: c.active,
                    greeting: c.greeting.clone(),
                })
            })
            .collect();
        Self { channels }
    }

    pub fn get(&self, channel_id: &str) -> Option<&ChannelEntry> {
        self.channels.get(channel_id)
    }

    /// Look up a channel and require it to be active.
    pub fn ensure_active(&self, channel_id: &str) -> Result<&ChannelEntry> {
        let entry = self
            .channels
            .get(channel_id)
            .ok_or_else(|| AuthError::channel_not_found(channel_id))?;
        if !entry.active {
            return Err(AuthError::channel_inactive(channel_id));
        }
        Ok(entry)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.channels.keys().map(|s| s.as_str()).collect()
    }
}
