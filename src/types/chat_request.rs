use serde::{Deserialize, Serialize};

use crate::types::Chat;

/// Body of a chat creation request, and of the service's answer to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The chat.
    pub chat: Chat,
}

impl ChatRequest {
    /// Wrap a chat.
    pub fn new(chat: Chat) -> Self {
        Self { chat }
    }
}
