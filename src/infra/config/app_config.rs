use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::broker::{hub::DEFAULT_CHANNEL_CAPACITY, store::DEFAULT_MAX_MESSAGE_CHARS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub store: StoreConfig,
    pub hub: HubConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub persist: bool,
    /// Overrides the journal location resolved from the storage layout.
    pub journal_path: Option<PathBuf>,
    pub fsync: bool,
    pub max_message_chars: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persist: true,
            journal_path: None,
            fsync: false,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubConfig {
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7878".to_owned(),
        }
    }
}
