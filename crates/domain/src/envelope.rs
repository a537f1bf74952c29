//! The tool result envelope.
//!
//! Every tool invocation resolves to one of two wire shapes:
//!
//! - Ok:    `{"content":[{"type":"text","text":"..."}]}`
//! - Error: `{"isError":true,"content":[{"type":"text","text":"..."}]}`
//!
//! These are also the shapes wrapped as the JSON-RPC `result` field for
//! `tools/call`. Internal `Err` values never travel as transport-level
//! errors; those are reserved for malformed JSON and unknown methods.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single content item in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".into(),
            text: text.into(),
        }
    }
}

/// The envelope returned by every tool body and by the skill runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub content: Vec<ContentItem>,
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result carrying plain text.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: false,
        }
    }

    /// Error result carrying the reason as chat-visible text.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(reason)],
            is_error: true,
        }
    }

    /// The first text item, or the empty string.
    pub fn text(&self) -> &str {
        self.content
            .iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .unwrap_or("")
    }
}

/// Tool definition exposed through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_omits_is_error() {
        let json = serde_json::to_string(&ToolResult::ok("hi")).unwrap();
        assert_eq!(json, r#"{"content":[{"type":"text","text":"hi"}]}"#);
    }

    #[test]
    fn error_envelope_carries_flag() {
        let json = serde_json::to_value(ToolResult::error("nope")).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["content"][0]["text"], "nope");
    }

    #[test]
    fn text_accessor_finds_first_text_item() {
        let result = ToolResult::ok("first");
        assert_eq!(result.text(), "first");
        let empty = ToolResult {
            content: vec![],
            is_error: false,
        };
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn deserialize_missing_is_error_defaults_false() {
        let raw = r#"{"content":[{"type":"text","text":"x"}]}"#;
        let parsed: ToolResult = serde_json::from_str(raw).unwrap();
        assert!(!parsed.is_error);
    }
}
