use std::sync::Arc;

use rivalscope_config::AppConfig;

use crate::chat::ChatService;

/// Shared state passed to all route handlers.
pub struct AppState {
    pub config: AppConfig,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(config: AppConfig, chat: ChatService) -> Self {
        Self { config, chat }
    }
}

pub type SharedState = Arc<AppState>;
