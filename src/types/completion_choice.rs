use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ContentFilterResults;

/// Why the model stopped producing a choice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    /// The model finished naturally.
    Stop,
    /// The token limit was reached.
    Length,
    /// Content was withheld by a filter.
    ContentFilter,
    /// The model asked for tools.
    ToolCalls,
    /// The model asked for a function (legacy form of tool calls).
    FunctionCall,
    /// A reason this client does not know about.
    Other(String),
}

impl FinishReason {
    /// The wire spelling.
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::FunctionCall => "function_call",
            FinishReason::Other(other) => other,
        }
    }
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "tool_calls" => FinishReason::ToolCalls,
            "function_call" => FinishReason::FunctionCall,
            _ => FinishReason::Other(value),
        }
    }
}

impl From<FinishReason> for String {
    fn from(value: FinishReason) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The incremental part of a streamed choice.
///
/// A delta may carry a role marker, a content fragment, both, or nothing.  Fields this
/// client does not model are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    /// Role marker, usually only on the first chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Content fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Any other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Delta {
    /// Returns true if the delta carries nothing.
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.content.is_none() && self.extra.is_empty()
    }
}

/// One choice within a streamed chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    /// Position of the choice.
    pub index: u32,

    /// The incremental content.
    pub delta: Delta,

    /// Null while streaming.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,

    /// Content filter verdicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filter_results: Option<ContentFilterResults>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_only_delta() {
        let choice: CompletionChoice = serde_json::from_value(json!({
            "index": 0,
            "delta": {"role": "assistant"},
            "finish_reason": null
        }))
        .unwrap();
        assert_eq!(choice.delta.role.as_deref(), Some("assistant"));
        assert!(choice.delta.content.is_none());
        assert!(choice.finish_reason.is_none());
    }

    #[test]
    fn empty_delta() {
        let choice: CompletionChoice = serde_json::from_value(json!({
            "index": 0,
            "delta": {},
            "finish_reason": "stop"
        }))
        .unwrap();
        assert!(choice.delta.is_empty());
        assert_eq!(choice.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn unknown_delta_fields_are_kept() {
        let delta: Delta =
            serde_json::from_value(json!({"content": "x", "tool_calls": []})).unwrap();
        assert_eq!(delta.content.as_deref(), Some("x"));
        assert_eq!(delta.extra.get("tool_calls"), Some(&json!([])));
    }

    #[test]
    fn finish_reasons_keep_their_spelling() {
        for reason in ["stop", "length", "content_filter", "tool_calls", "eos"] {
            let parsed: FinishReason = serde_json::from_value(json!(reason)).unwrap();
            assert_eq!(parsed.as_str(), reason);
            assert_eq!(serde_json::to_value(&parsed).unwrap(), json!(reason));
        }
        assert_eq!(
            FinishReason::from("eos".to_string()),
            FinishReason::Other("eos".to_string())
        );
    }

    #[test]
    fn missing_delta_is_rejected() {
        let result = serde_json::from_value::<CompletionChoice>(json!({"index": 0}));
        assert!(result.is_err());
    }
}
