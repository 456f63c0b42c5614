use crate::chat::ChatController;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The chat driven by this server
    pub chat: Arc<ChatController>,
}

impl AppState {
    pub fn new(chat: Arc<ChatController>) -> Self {
        Self { chat }
    }
}
