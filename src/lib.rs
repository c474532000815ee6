//! Client library for the Inception Labs chat service.
//!
//! [`Inception`] creates, lists and deletes chats and streams completions as a sequence of
//! [`CompletionChunk`]s.  Request headers come from a [`HeaderProvider`]: an API key via
//! [`StaticHeaders`], or an interactive [`BrowserLogin`].

// Public modules
pub mod accumulating_stream;
pub mod auth;
pub mod browser;
pub mod cli;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod observability;
pub mod sse;
pub mod types;
pub mod utils;

// Re-exports
pub use accumulating_stream::{AccumulatingStream, Completion, collect_text};
pub use auth::{
    BrowserCookie, BrowserDriver, BrowserLogin, CapturedRequest, HeaderProvider, LoginOptions,
    StaticHeaders, browser_login, static_headers,
};
pub use browser::ChromeDriver;
pub use client::{DEFAULT_BASE_URL, Inception};
pub use client_logger::ClientLogger;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use sse::{ChunkStream, DONE_SENTINEL, StreamOptions, decode_chunk, process_sse};
pub use types::*;
