//! Reading secrets at the terminal without echoing them.

use std::borrow::Cow;

use rustyline::completion::Completer;
use rustyline::config::Configurer;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{ColorMode, Editor, Helper};

/// Draws every typed character as `*`.
#[derive(Debug, Default)]
pub struct MaskingHelper;

impl Highlighter for MaskingHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned("*".repeat(line.chars().count()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

impl Completer for MaskingHelper {
    type Candidate = String;
}

impl Hinter for MaskingHelper {
    type Hint = String;
}

impl Validator for MaskingHelper {}

impl Helper for MaskingHelper {}

/// Prompt for a secret.  The terminal shows only `*`s and nothing enters history.
pub fn read_secret(prompt: &str) -> rustyline::Result<String> {
    let mut rl: Editor<MaskingHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(MaskingHelper));
    // Masking is drawn by the highlighter, which only runs when color is on.
    rl.set_color_mode(ColorMode::Forced);
    rl.set_auto_add_history(false);
    rl.readline(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let helper = MaskingHelper;
        assert_eq!(helper.highlight("sk-abc123", 0), "*********");
        assert_eq!(helper.highlight("", 0), "");
        assert_eq!(helper.highlight("clé", 3), "***");
        assert!(helper.highlight_char("k", 1, CmdKind::Other));
    }
}
