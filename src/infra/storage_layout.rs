use std::path::PathBuf;

use crate::infra::{config::StoreConfig, error::AppError};

const APP_DIR_NAME: &str = "chatlog";
const JOURNAL_FILE_NAME: &str = "messages.jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub data_dir: PathBuf,
}

impl StorageLayout {
    /// Resolves `<data dir>/chatlog`, honouring `XDG_DATA_HOME` on Linux.
    pub fn resolve() -> Result<Self, AppError> {
        let data_base = dirs::data_dir().ok_or_else(|| AppError::StoragePathResolution {
            details: "unable to resolve user data directory".into(),
        })?;

        Ok(Self {
            data_dir: data_base.join(APP_DIR_NAME),
        })
    }

    pub fn journal_file(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILE_NAME)
    }
}

/// Journal location for this run: the configured override, else the layout
/// default.
pub fn journal_path(config: &StoreConfig) -> Result<PathBuf, AppError> {
    match &config.journal_path {
        Some(path) => Ok(path.clone()),
        None => Ok(StorageLayout::resolve()?.journal_file()),
    }
}
