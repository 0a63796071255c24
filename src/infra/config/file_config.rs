use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, HubConfig, LogConfig, ServerConfig, StoreConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub store: Option<FileStoreConfig>,
    pub hub: Option<FileHubConfig>,
    pub server: Option<FileServerConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(store) = self.store {
            store.merge_into(&mut config.store);
        }

        if let Some(hub) = self.hub {
            hub.merge_into(&mut config.hub);
        }

        if let Some(server) = self.server {
            server.merge_into(&mut config.server);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileStoreConfig {
    pub persist: Option<bool>,
    pub journal_path: Option<PathBuf>,
    pub fsync: Option<bool>,
    pub max_message_chars: Option<usize>,
}

impl FileStoreConfig {
    fn merge_into(self, config: &mut StoreConfig) {
        if let Some(persist) = self.persist {
            config.persist = persist;
        }

        if let Some(journal_path) = self.journal_path {
            config.journal_path = Some(journal_path);
        }

        if let Some(fsync) = self.fsync {
            config.fsync = fsync;
        }

        if let Some(max_message_chars) = self.max_message_chars {
            config.max_message_chars = max_message_chars;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileHubConfig {
    pub channel_capacity: Option<usize>,
}

impl FileHubConfig {
    fn merge_into(self, config: &mut HubConfig) {
        if let Some(channel_capacity) = self.channel_capacity {
            config.channel_capacity = channel_capacity;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileServerConfig {
    pub bind_addr: Option<String>,
}

impl FileServerConfig {
    fn merge_into(self, config: &mut ServerConfig) {
        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
    }
}
