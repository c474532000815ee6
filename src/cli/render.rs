//! Output rendering for the command-line tool.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::ChatSummary;

const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RESET: &str = "\x1b[0m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RED: &str = "\x1b[31m";

/// Marker for the default chat in listings.
pub const DEFAULT_MARKER: &str = "✓";

/// Where the tool's output goes.
///
/// The terminal implementation is [`PlainTextRenderer`]; tests substitute one that records.
pub trait Renderer: Send {
    /// A content delta, printed as it arrives.
    fn print_text(&mut self, text: &str);

    fn print_error(&mut self, error: &str);

    fn print_info(&mut self, info: &str);

    /// The response is over; leave the cursor on a fresh line.
    fn finish_response(&mut self);

    fn print_interrupted(&mut self) {}

    /// Polled while a response streams.  True abandons the response.
    fn should_interrupt(&self) -> bool {
        false
    }

    fn use_color(&self) -> bool {
        false
    }
}

/// Writes to the terminal, optionally with ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    mid_line: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// A renderer with styling on.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            mid_line: false,
            interrupted: None,
        }
    }

    /// Report interrupts whenever `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    fn paint<'a>(&self, style: &str, text: &'a str) -> std::borrow::Cow<'a, str> {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}").into()
        } else {
            text.into()
        }
    }

    fn end_line(&mut self) {
        if std::mem::take(&mut self.mid_line) {
            println!();
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{text}");
        self.mid_line = !text.ends_with('\n');
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.end_line();
        self.flush();
        eprintln!("{} {error}", self.paint(ANSI_RED, "error:"));
    }

    fn print_info(&mut self, info: &str) {
        self.end_line();
        println!("{}", self.paint(ANSI_DIM, info));
        self.flush();
    }

    fn finish_response(&mut self) {
        self.end_line();
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.print_info("(stopped)");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn use_color(&self) -> bool {
        self.use_color
    }
}

/// Format chats as an id/title/default table.
pub fn chat_table(chats: &[ChatSummary], default: Option<&str>, use_color: bool) -> String {
    const ID: &str = "ID";
    const TITLE: &str = "Title";
    let id_width = chats
        .iter()
        .map(|c| c.id.chars().count())
        .chain([ID.len()])
        .max()
        .unwrap_or(ID.len());
    let title_width = chats
        .iter()
        .map(|c| c.title.chars().count())
        .chain([TITLE.len()])
        .max()
        .unwrap_or(TITLE.len());

    let mut out = format!("{ID:<id_width$}  {TITLE:<title_width$}  Default\n");
    out.push_str(&format!(
        "{}  {}  {}\n",
        "-".repeat(id_width),
        "-".repeat(title_width),
        "-".repeat("Default".len())
    ));
    for chat in chats {
        let marker = if Some(chat.id.as_str()) == default {
            if use_color {
                format!("{ANSI_GREEN}{DEFAULT_MARKER}{ANSI_RESET}")
            } else {
                DEFAULT_MARKER.to_string()
            }
        } else {
            String::new()
        };
        let line = format!(
            "{:<id_width$}  {:<title_width$}  {marker}",
            chat.id, chat.title
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
