use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Message;

/// The message tree of a chat, stored as a map from message id to message.
///
/// `current_id` names the active leaf.  Whenever `messages` is non-empty it must be a key
/// of `messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatHistory {
    /// Every message in the tree, by id.
    #[serde(default)]
    pub messages: BTreeMap<String, Message>,

    /// Id of the active leaf.
    #[serde(default)]
    pub current_id: String,
}

impl ChatHistory {
    /// Create a history holding a single root message.
    pub fn new(message: Message) -> Self {
        let current_id = message.id.clone();
        let mut messages = BTreeMap::new();
        messages.insert(current_id.clone(), message);
        Self {
            messages,
            current_id,
        }
    }

    /// Append `message` as a child of the current leaf and make it current.
    ///
    /// The message's `parent_id` is overwritten and the parent's `children_ids` updated.
    /// An id already in the tree is rejected and the history is left untouched.
    pub fn push(&mut self, mut message: Message) -> Result<&Message> {
        let id = message.id.clone();
        if self.messages.contains_key(&id) {
            return Err(Error::validation(
                format!("message {id:?} is already in the history"),
                Some("message.id".to_string()),
            ));
        }
        if let Some(parent) = self.messages.get_mut(&self.current_id) {
            if !parent.children_ids.contains(&id) {
                parent.children_ids.push(id.clone());
            }
            message.parent_id = Some(parent.id.clone());
        } else {
            message.parent_id = None;
        }
        self.current_id = id.clone();
        Ok(self.messages.entry(id).or_insert(message))
    }

    /// The active leaf, if any.
    pub fn current(&self) -> Option<&Message> {
        self.messages.get(&self.current_id)
    }

    /// Look up a message by id.
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }

    /// Number of messages in the tree.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the tree holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The path from the root to the current leaf, in conversation order.
    ///
    /// Broken parent links end the walk; a cycle cannot loop forever.
    pub fn thread(&self) -> Vec<&Message> {
        let mut thread = Vec::new();
        let mut next = self.current();
        while let Some(message) = next {
            if thread.len() >= self.messages.len() {
                break;
            }
            thread.push(message);
            next = message.parent_id.as_deref().and_then(|id| self.get(id));
        }
        thread.reverse();
        thread
    }

    /// Check that `current_id` names a message whenever there are messages.
    pub fn validate(&self) -> Result<()> {
        if !self.messages.is_empty() && !self.messages.contains_key(&self.current_id) {
            return Err(Error::validation(
                format!("current id {:?} is not in the history", self.current_id),
                Some("history.current_id".to_string()),
            ));
        }
        for (key, message) in &self.messages {
            if key != &message.id {
                return Err(Error::validation(
                    format!("history key {key:?} holds message {:?}", message.id),
                    Some("history.messages".to_string()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_history_points_at_its_message() {
        let message = Message::user("test");
        let history = ChatHistory::new(message.clone());
        assert_eq!(history.len(), 1);
        assert_eq!(history.current_id, message.id);
        assert_eq!(history.current(), Some(&message));
        history.validate().unwrap();
    }

    #[test]
    fn push_links_parent_and_child() {
        let root = Message::user("question");
        let root_id = root.id.clone();
        let mut history = ChatHistory::new(root);
        let reply_id = history.push(Message::assistant("answer")).unwrap().id.clone();

        assert_eq!(history.current_id, reply_id);
        assert_eq!(
            history.get(&reply_id).unwrap().parent_id.as_deref(),
            Some(root_id.as_str())
        );
        assert_eq!(history.get(&root_id).unwrap().children_ids, vec![reply_id]);
        history.validate().unwrap();
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut history = ChatHistory::new(Message::user("question"));
        let reply = Message::assistant("answer");
        history.push(reply.clone()).unwrap();
        let before = history.clone();

        let err = history.push(reply).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(history, before);

        let root = history.thread()[0].clone();
        assert!(history.push(root).unwrap_err().is_validation());
        assert_eq!(history, before);
        history.validate().unwrap();
    }

    #[test]
    fn thread_walks_root_to_leaf() {
        let mut history = ChatHistory::new(Message::user("one"));
        history.push(Message::assistant("two")).unwrap();
        history.push(Message::user("three")).unwrap();
        let contents: Vec<_> = history
            .thread()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn dangling_current_id_is_invalid() {
        let mut history = ChatHistory::new(Message::user("test"));
        history.current_id = "missing".to_string();
        assert!(history.validate().unwrap_err().is_validation());
    }

    #[test]
    fn empty_history_is_valid() {
        let history: ChatHistory =
            serde_json::from_str(r#"{"messages": {}, "current_id": "test-message-id"}"#).unwrap();
        assert!(history.is_empty());
        history.validate().unwrap();
        assert!(history.thread().is_empty());
    }
}
