//! Parsing for subcommands and for the slash commands of the interactive chat.

/// A subcommand of the tool, parsed from the free arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Save credentials: an API key, or headers captured by a browser login.
    Login,
    /// Remove saved credentials.
    Logout,
    /// Report whether credentials are saved and whether they work.
    Status,
    /// List a page of chats.
    ListChats {
        /// Page number, starting at 1.
        page: u32,
    },
    /// Create a chat.
    NewChat {
        /// Text of the first message.
        text: String,
    },
    /// Delete a chat.
    DeleteChat {
        /// Chat id.
        id: String,
    },
    /// Make a chat the default.
    SetDefault {
        /// Chat id.
        id: String,
    },
    /// Send one message to the default chat.
    Input {
        /// The message.
        message: String,
    },
    /// Interactive multi-turn chat.
    Chat,
    /// Print usage.
    Help,
}

/// First message of chats created without one.
pub const DEFAULT_GREETING: &str = "Hello!";

/// Parse the free arguments into a [`Command`].
///
/// # Examples
///
/// ```
/// # use inception::cli::{Command, parse_subcommand};
/// let args: Vec<String> = vec!["chats".into(), "ls".into(), "2".into()];
/// assert_eq!(parse_subcommand(&args), Ok(Command::ListChats { page: 2 }));
/// ```
pub fn parse_subcommand(args: &[String]) -> Result<Command, String> {
    let words: Vec<&str> = args.iter().map(String::as_str).collect();
    match words.as_slice() {
        [] | ["help"] => Ok(Command::Help),
        ["auth", "login"] => Ok(Command::Login),
        ["auth", "logout"] => Ok(Command::Logout),
        ["auth", "status"] => Ok(Command::Status),
        ["auth", ..] => Err("usage: auth login|logout|status".to_string()),
        ["chats", "ls"] | ["chats", "list"] => Ok(Command::ListChats { page: 1 }),
        ["chats", "ls" | "list", page] => match page.parse::<u32>() {
            Ok(page) if page > 0 => Ok(Command::ListChats { page }),
            _ => Err(format!("page must be a positive integer, not {page:?}")),
        },
        ["chats", "new"] => Ok(Command::NewChat {
            text: DEFAULT_GREETING.to_string(),
        }),
        ["chats", "new", text @ ..] => Ok(Command::NewChat {
            text: text.join(" "),
        }),
        ["chats", "delete" | "rm", id] => Ok(Command::DeleteChat { id: id.to_string() }),
        ["chats", "set-default", id] => Ok(Command::SetDefault { id: id.to_string() }),
        ["chats", ..] => {
            Err("usage: chats ls [PAGE] | new [TEXT] | delete ID | set-default ID".to_string())
        }
        ["input"] => Err("input requires a message".to_string()),
        ["input", message @ ..] => Ok(Command::Input {
            message: message.join(" "),
        }),
        ["chat"] => Ok(Command::Chat),
        [other, ..] => Err(format!("unknown command: {other}")),
    }
}

/// Usage text for the tool.
pub fn usage() -> &'static str {
    r#"inception-api [OPTIONS] COMMAND

Commands:
  auth login             Save an API key (or, with --browser, log in through a browser)
  auth logout            Remove saved credentials
  auth status            Show whether saved credentials work
  chats ls [PAGE]        List chats
  chats new [TEXT]       Create a chat whose first message is TEXT
  chats delete ID        Delete a chat
  chats set-default ID   Use chat ID for input and chat
  input MESSAGE...       Send one message to the default chat
  chat                   Start an interactive chat
  help                   Show this help message"#
}

/// A line typed at the chat prompt that starts with `/`.  Never sent to the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Forget the local thread.
    Clear,
    /// Switch models for later turns.
    Model(String),
    Help,
    Quit,
    Stats,
    /// A malformed command; the message says what was wrong.
    Invalid(String),
}

/// Recognize a slash command.  `None` means the line is a message for the model.
///
/// ```
/// # use inception::cli::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
/// assert!(parse_command("what is /dev/null?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let body = input.trim().strip_prefix('/')?;
    let (name, argument) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let command = match (name.to_ascii_lowercase().as_str(), argument) {
        ("model", "") => ChatCommand::Invalid(
            "/model needs a name, e.g. /model lambda.mercury-coder-mini".to_string(),
        ),
        ("model", model) => ChatCommand::Model(model.to_string()),
        ("clear", _) => ChatCommand::Clear,
        ("stats", _) => ChatCommand::Stats,
        ("help" | "?", _) => ChatCommand::Help,
        ("quit" | "exit" | "q", _) => ChatCommand::Quit,
        (other, _) => ChatCommand::Invalid(format!("no such command /{other}; try /help")),
    };
    Some(command)
}

/// The slash commands, one per line.
pub fn help_text() -> &'static str {
    r#"/model NAME   use NAME for the rest of the session
/clear        forget the local thread (the chat on the service is kept)
/stats        requests, chunks and tokens so far
/help         this list
/quit         leave (Ctrl+D works too)
Ctrl+C while a response streams stops it."#
}
