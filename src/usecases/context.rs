use crate::{infra::config::AppConfig, usecases::chat_service::ChatService};

#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    pub service: ChatService,
}

impl AppContext {
    pub fn new(config: AppConfig, service: ChatService) -> Self {
        Self { config, service }
    }
}
