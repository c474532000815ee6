use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{ChatHistory, Message};
use crate::utils::time::unix_millis;

/// Title given to chats that were not named.
pub const DEFAULT_TITLE: &str = "New Chat";

/// A chat held by the service.
///
/// `messages` is a second view over `history`: every listed message must also appear in
/// `history.messages` by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    /// Assigned by the service on creation; empty beforehand.
    #[serde(default)]
    pub id: String,

    /// Chat title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Models associated with the chat.
    pub models: Vec<String>,

    /// Free-form parameters.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// The message tree.
    pub history: ChatHistory,

    /// The messages, in order.
    pub messages: Vec<Message>,

    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default = "unix_millis")]
    pub timestamp: i64,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Chat {
    /// Create an unsaved chat whose history starts at `first`.
    ///
    /// `first` is tagged with `model` when it names no models of its own.
    pub fn new(model: impl Into<String>, mut first: Message) -> Self {
        let model = model.into();
        if first.models.is_empty() {
            first.models = vec![model.clone()];
        }
        Self {
            id: String::new(),
            title: default_title(),
            models: vec![model],
            params: Map::new(),
            history: ChatHistory::new(first.clone()),
            messages: vec![first],
            tags: Vec::new(),
            timestamp: unix_millis(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Append a message to both the history and the message list.
    ///
    /// Fails without changing the chat when the message id is already present.
    pub fn push(&mut self, message: Message) -> Result<()> {
        let pushed = self.history.push(message)?.clone();
        if let Some(parent_id) = pushed.parent_id.as_deref()
            && let Some(parent) = self.messages.iter_mut().find(|m| m.id == parent_id)
            && !parent.children_ids.contains(&pushed.id)
        {
            parent.children_ids.push(pushed.id.clone());
        }
        self.messages.push(pushed);
        Ok(())
    }

    /// Check the history invariants and that every listed message is in the history.
    pub fn validate(&self) -> Result<()> {
        self.history.validate()?;
        for message in &self.messages {
            if !self.history.messages.contains_key(&message.id) {
                return Err(Error::validation(
                    format!("message {:?} is listed but not in the history", message.id),
                    Some("messages".to_string()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_chat_is_consistent() {
        let chat = Chat::new("lambda.mercury-coder-small", Message::user("test"));
        assert_eq!(chat.id, "");
        assert_eq!(chat.title, "New Chat");
        assert_eq!(chat.models, vec!["lambda.mercury-coder-small"]);
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].models, vec!["lambda.mercury-coder-small"]);
        assert_eq!(chat.history.current_id, chat.messages[0].id);
        chat.validate().unwrap();
    }

    #[test]
    fn push_keeps_both_views_in_sync() {
        let mut chat = Chat::new("m", Message::user("hi"));
        chat.push(Message::assistant("hello")).unwrap();
        chat.validate().unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].children_ids, vec![chat.messages[1].id.clone()]);
        assert_eq!(chat.history.current_id, chat.messages[1].id);
    }

    #[test]
    fn push_rejects_a_repeated_message() {
        let mut chat = Chat::new("m", Message::user("hi"));
        let first = chat.messages[0].clone();
        assert!(chat.push(first).unwrap_err().is_validation());
        assert_eq!(chat.messages.len(), 1);
        chat.validate().unwrap();
    }

    #[test]
    fn listed_message_missing_from_history_is_invalid() {
        let mut chat = Chat::new("m", Message::user("hi"));
        chat.messages.push(Message::user("stray"));
        assert!(chat.validate().unwrap_err().is_validation());
    }

    #[test]
    fn parses_service_echo() {
        let chat: Chat = serde_json::from_value(json!({
            "id": "test-chat-id",
            "title": "Test Chat",
            "models": ["lambda.mercury-coder-small"],
            "params": {},
            "history": {"messages": {}, "current_id": "test-message-id"},
            "messages": [],
            "tags": [],
            "timestamp": 1742265411000i64
        }))
        .unwrap();
        assert_eq!(chat.id, "test-chat-id");
        assert_eq!(chat.title, "Test Chat");
        assert_eq!(chat.timestamp, 1742265411000);
    }

    #[test]
    fn missing_history_is_rejected() {
        let result = serde_json::from_value::<Chat>(json!({
            "id": "x",
            "models": [],
            "messages": []
        }));
        assert!(result.is_err());
    }
}
