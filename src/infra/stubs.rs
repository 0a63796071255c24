use anyhow::Result;

use crate::infra::{config::AppConfig, contracts::ConfigAdapter};

/// Config source that never touches disk: in-memory store, defaults otherwise.
#[derive(Debug, Clone, Default)]
pub struct EphemeralConfigAdapter;

impl ConfigAdapter for EphemeralConfigAdapter {
    fn load(&self) -> Result<AppConfig> {
        let mut config = AppConfig::default();
        config.store.persist = false;
        Ok(config)
    }
}
