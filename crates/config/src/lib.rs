//! Configuration schema and file loading for convoy.

pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, find_config_file, load_config},
    schema::{
        AuthConfig, ChannelConfig, ChannelKind, ConvoyConfig, GatewayConfig, QueueConfig,
        QueueOverride, ResolvedQueueConfig, SessionConfig,
    },
};
