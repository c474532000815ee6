use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::ids::new_id;
use crate::utils::time::unix_seconds;

/// Role used for messages typed by the user.
pub const ROLE_USER: &str = "user";

/// Role used for messages produced by the model.
pub const ROLE_ASSISTANT: &str = "assistant";

/// Role used for system instructions.
pub const ROLE_SYSTEM: &str = "system";

/// One message in a conversation.
///
/// Messages form a tree through `parent_id` and `children_ids`; the tree itself is stored
/// by [`ChatHistory`](crate::types::ChatHistory) as a map from id to message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique id.  Generated when absent or null.
    #[serde(default = "new_id", deserialize_with = "id_or_new")]
    pub id: String,

    /// The message this one answers, if any.
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Messages that answer this one.
    #[serde(default)]
    pub children_ids: Vec<String>,

    /// Free-form role, e.g. "user" or "assistant".
    pub role: String,

    /// Text content.
    pub content: String,

    /// Creation time in seconds since the Unix epoch.
    #[serde(default = "default_timestamp")]
    pub timestamp: Option<i64>,

    /// Models associated with the message.
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_timestamp() -> Option<i64> {
    Some(unix_seconds())
}

fn id_or_new<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<String>::deserialize(deserializer)?;
    Ok(id.unwrap_or_else(new_id))
}

impl Message {
    /// Create a new message with a fresh id and the current time.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            parent_id: None,
            children_ids: Vec::new(),
            role: role.into(),
            content: content.into(),
            timestamp: default_timestamp(),
            models: Vec::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    /// Set the models associated with this message.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Set the parent of this message.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Returns true if this message was written by the user.
    pub fn is_user(&self) -> bool {
        self.role == ROLE_USER
    }
}
