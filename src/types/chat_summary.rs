use serde_json::Value;

/// Title shown for listed chats that carry none.
const UNTITLED: &str = "Untitled";

/// The id and title of a chat as it appears in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    /// Chat id.
    pub id: String,
    /// Chat title.
    pub title: String,
}

/// Extract chat summaries from a listing returned by
/// [`Inception::list_chats`](crate::Inception::list_chats).
///
/// The service has answered both with `{"chats": [...]}` and with a bare array; both are
/// accepted.  Entries without a string id are skipped.
pub fn chat_summaries(listing: &Value) -> Vec<ChatSummary> {
    let entries: &[Value] = match listing {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(object) => match object.get("chats") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?.to_string();
            let title = entry
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(UNTITLED)
                .to_string();
            Some(ChatSummary { id, title })
        })
        .collect()
}

/// Returns true if the listing contains a chat with the given id.
pub fn listing_contains(listing: &Value, id: &str) -> bool {
    chat_summaries(listing).iter().any(|chat| chat.id == id)
}
