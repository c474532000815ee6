//! A hook for observing what the [`Inception`](crate::Inception) client sends and receives.

use serde_json::Value;

use crate::{Chat, CompletionChunk};

/// Receives the payloads the client decodes.
///
/// Install one with [`Inception::with_logger`](crate::Inception::with_logger).  The client
/// itself never writes to stdout or stderr, so this is the way to trace its traffic.
///
/// ```rust,ignore
/// use inception::{Chat, ClientLogger, CompletionChunk};
///
/// struct Stderr;
///
/// impl ClientLogger for Stderr {
///     fn log_chat(&self, chat: &Chat) {
///         eprintln!("created {} ({} messages)", chat.id, chat.messages.len());
///     }
///
///     fn log_listing(&self, listing: &serde_json::Value) {
///         eprintln!("listing: {listing}");
///     }
///
///     fn log_chunk(&self, chunk: &CompletionChunk) {
///         if let Some(text) = chunk.content() {
///             eprintln!("chunk {}: {text:?}", chunk.id);
///         }
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log the chat echoed back by a successful `create_chat` call.
    fn log_chat(&self, chat: &Chat);

    /// Log the raw payload of a successful `list_chats` call.
    fn log_listing(&self, listing: &Value);

    /// Log an individual streamed chunk, as it is handed to the consumer.
    fn log_chunk(&self, chunk: &CompletionChunk);
}
