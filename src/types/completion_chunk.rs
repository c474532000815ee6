use serde::{Deserialize, Serialize};

use crate::types::{CompletionChoice, FinishReason, Usage};

/// One decoded event of a streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChunk {
    /// Completion id, shared by every chunk of one response.
    pub id: String,

    /// Object kind, e.g. "chat.completion.chunk".
    pub object: String,

    /// Creation time in seconds since the Unix epoch.
    pub created: i64,

    /// Model that produced the chunk.
    pub model: String,

    /// Choices, in index order.
    pub choices: Vec<CompletionChoice>,

    /// Backend fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,

    /// Token counts; only meaningful on final chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    /// Content fragment of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }

    /// Role marker of the first choice, if any.
    pub fn role(&self) -> Option<&str> {
        self.choices.first()?.delta.role.as_deref()
    }

    /// Finish reason of the first choice, if it has finished.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.choices.first()?.finish_reason.as_ref()
    }
}
