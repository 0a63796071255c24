use std::{path::Path, sync::Arc};

use crate::{
    broker::{journal::Journal, store::MessageStore},
    infra::{
        self,
        config::{AppConfig, FileConfigAdapter},
        contracts::ConfigAdapter,
        error::AppError,
        storage_layout,
        stubs::EphemeralConfigAdapter,
    },
    usecases::{chat_service::ChatService, context::AppContext},
};

/// Loads configuration, installs logging and wires the store, hub and chat
/// service together.
pub fn bootstrap(config_path: Option<&Path>, ephemeral: bool) -> Result<AppContext, AppError> {
    let config = load_config(config_path, ephemeral)?;
    infra::logging::init(&config.logging)?;

    build_context(config)
}

pub fn load_config(config_path: Option<&Path>, ephemeral: bool) -> Result<AppConfig, AppError> {
    let adapter: Box<dyn ConfigAdapter> = if ephemeral {
        Box::new(EphemeralConfigAdapter)
    } else {
        Box::new(FileConfigAdapter::new(config_path))
    };

    adapter.load().map_err(AppError::Other)
}

fn build_context(config: AppConfig) -> Result<AppContext, AppError> {
    let store = build_store(&config)?;
    let service = ChatService::over(Arc::new(store), config.hub.channel_capacity);

    Ok(AppContext::new(config, service))
}

fn build_store(config: &AppConfig) -> Result<MessageStore, AppError> {
    let store = if config.store.persist {
        let path = storage_layout::journal_path(&config.store)?;
        let (journal, replayed) = Journal::open(&path, config.store.fsync)?;
        MessageStore::journaled(journal, replayed)
    } else {
        tracing::info!("journal disabled; messages live for this process only");
        MessageStore::in_memory()
    };

    Ok(store.with_max_message_chars(config.store.max_message_chars))
}
