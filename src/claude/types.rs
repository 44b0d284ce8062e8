// Wire types for the Claude Messages API
//
// Content blocks are a closed tagged enum: anything the endpoint sends that is
// not text or tool_use is dropped at the streaming boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::types::{ToolDefinition, ToolUse};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of turn content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, ContentBlock::ToolUse { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<ToolUse> {
        match self {
            ContentBlock::ToolUse { id, name, input } => Some(ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            _ => None,
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// A user turn carrying a single tool result
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }],
        }
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool uses in emitted order
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content.iter().filter_map(ContentBlock::as_tool_use).collect()
    }

    pub fn has_tool_uses(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_use)
    }
}

/// Why generation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other(String),
}

impl StopReason {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            other => StopReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::Other(other) => other,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting reported by the endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Final structured message of one completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl CompletionResult {
    pub fn into_message(self) -> Message {
        Message::assistant(self.content)
    }
}

/// Streaming Messages API request body
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ToolDefinition],
    pub stream: bool,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_wire_shape() {
        let msg = Message::tool_result("toolu_1", "hello", false);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "content": "hello",
                    "is_error": false
                }]
            })
        );
    }

    #[test]
    fn test_tool_use_keeps_input_key_order() {
        let raw = r#"{"type":"tool_use","id":"toolu_1","name":"a__b","input":{"z":1,"a":2}}"#;
        let block: ContentBlock = serde_json::from_str(raw).unwrap();
        let serialized = serde_json::to_string(&block).unwrap();
        assert!(serialized.contains(r#""input":{"z":1,"a":2}"#));
    }

    #[test]
    fn test_unknown_block_type_rejected() {
        let raw = r#"{"type":"image","source":{}}"#;
        assert!(serde_json::from_str::<ContentBlock>(raw).is_err());
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(StopReason::from_wire("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_wire("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::from_wire("max_tokens"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_wire("stop_sequence"),
            StopReason::Other("stop_sequence".to_string())
        );
        assert_eq!(StopReason::Other("pause_turn".into()).to_string(), "pause_turn");
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let messages = vec![Message::user("hi")];
        let request = MessageRequest {
            model: "claude-3-5-sonnet-latest",
            max_tokens: 16,
            system: None,
            messages: &messages,
            tools: &[],
            stream: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("system").is_none());
        assert_eq!(value["stream"], json!(true));
    }

    #[test]
    fn test_message_helpers() {
        let msg = Message::assistant(vec![
            ContentBlock::text("Let me "),
            ContentBlock::text("check."),
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "ns__echo".into(),
                input: Map::new(),
            },
        ]);
        assert_eq!(msg.text(), "Let me check.");
        assert!(msg.has_tool_uses());
        assert_eq!(msg.tool_uses()[0].name, "ns__echo");
    }
}
