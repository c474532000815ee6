// Public modules
pub mod chat;
pub mod chat_completion_request;
pub mod chat_history;
pub mod chat_request;
pub mod chat_summary;
pub mod completion_choice;
pub mod completion_chunk;
pub mod content_filter_results;
pub mod message;
pub mod model;
pub mod usage;

// Re-exports
pub use chat::{Chat, DEFAULT_TITLE};
pub use chat_completion_request::ChatCompletionRequest;
pub use chat_history::ChatHistory;
pub use chat_request::ChatRequest;
pub use chat_summary::{ChatSummary, chat_summaries, listing_contains};
pub use completion_choice::{CompletionChoice, Delta, FinishReason};
pub use completion_chunk::CompletionChunk;
pub use content_filter_results::{ContentFilterResult, ContentFilterResults};
pub use message::{Message, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER};
pub use model::{DEFAULT_MODEL, KNOWN_MODELS, is_known_model};
pub use usage::Usage;
