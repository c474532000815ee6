use serde::{Deserialize, Serialize};

/// Verdict for one content filter category.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentFilterResult {
    /// Whether the content was filtered.
    pub filtered: bool,

    /// Whether the category was detected, for categories that report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected: Option<bool>,
}

/// Content filter verdicts attached to a streamed choice.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentFilterResults {
    /// Hate speech.
    pub hate: ContentFilterResult,
    /// Self harm.
    pub self_harm: ContentFilterResult,
    /// Sexual content.
    pub sexual: ContentFilterResult,
    /// Violence.
    pub violence: ContentFilterResult,
    /// Jailbreak attempts.
    pub jailbreak: ContentFilterResult,
    /// Profanity.
    pub profanity: ContentFilterResult,
}

impl ContentFilterResults {
    /// Returns true if any category filtered the content.
    pub fn any_filtered(&self) -> bool {
        [
            self.hate,
            self.self_harm,
            self.sexual,
            self.violence,
            self.jailbreak,
            self.profanity,
        ]
        .iter()
        .any(|result| result.filtered)
    }
}
