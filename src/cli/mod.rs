//! The `inception-api` command-line tool.
//!
//! The binary is a thin shell over this module:
//!
//! - [`config`]: CLI argument parsing, the persisted config store, and resolved settings
//! - [`commands`]: subcommand and slash command parsing
//! - [`app`]: the commands themselves
//! - [`session`]: the interactive multi-turn session
//! - [`render`]: terminal output
//! - [`secret`]: masked input for API keys

mod app;
mod commands;
mod config;
mod render;
mod secret;
mod session;

pub use app::App;
pub use commands::{
    ChatCommand, Command, DEFAULT_GREETING, help_text, parse_command, parse_subcommand, usage,
};
pub use config::{CONFIG_DIR_ENV, CliArgs, CliConfig, ConfigStore, StoredConfig, resolve_config_dir};
pub use render::{DEFAULT_MARKER, PlainTextRenderer, Renderer, chat_table};
pub use secret::{MaskingHelper, read_secret};
pub use session::{ChatSession, SessionStats};
