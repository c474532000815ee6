use serde::{Deserialize, Serialize};

use crate::types::Message;
use crate::utils::ids::new_id;

/// Body of a streaming completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    /// Always true; this client only streams.
    pub stream: bool,

    /// Model identifier.
    pub model: String,

    /// The conversation so far.
    pub messages: Vec<Message>,

    /// Session id: twenty characters, no hyphens.
    pub session_id: String,

    /// Chat the completion belongs to.
    pub chat_id: String,

    /// Request id.
    #[serde(default = "new_id")]
    pub id: String,
}

impl ChatCompletionRequest {
    /// Create a streaming request with a fresh request id.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        session_id: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            stream: true,
            model: model.into(),
            messages,
            session_id: session_id.into(),
            chat_id: chat_id.into(),
            id: new_id(),
        }
    }
}
