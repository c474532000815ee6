use uuid::Uuid;

/// Length of a completion session id.
pub const SESSION_ID_LEN: usize = 20;

/// A fresh hyphenated UUID v4, used for message, chat, and request ids.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A fresh session id: twenty characters, no hyphens.
pub fn new_session_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SESSION_ID_LEN);
    id
}
