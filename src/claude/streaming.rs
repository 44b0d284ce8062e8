// Server-Sent Events parsing for Claude API streaming
//
// `StreamAccumulator` folds the event sequence of one response into a
// `CompletionResult`. It does no I/O so the client can feed it line by line.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::types::{CompletionResult, ContentBlock, StopReason, Usage};

/// Server-Sent Event from Claude API
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub delta: Option<StreamDelta>,
    #[serde(default)]
    pub content_block: Option<StartedBlock>,
    #[serde(default)]
    pub message: Option<StartedMessage>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<StreamError>,
}

/// Delta within a streaming event
///
/// `content_block_delta` carries `text` or `partial_json`; `message_delta`
/// carries `stop_reason`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamDelta {
    #[serde(rename = "type", default)]
    pub delta_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub partial_json: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Block header of a `content_block_start` event
#[derive(Debug, Clone, Deserialize)]
pub struct StartedBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message header of a `message_start` event
#[derive(Debug, Clone, Deserialize)]
pub struct StartedMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Payload of an `error` event
#[derive(Debug, Clone, Deserialize)]
pub struct StreamError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

impl StreamEvent {
    /// Check if this event contains a text delta
    pub fn is_text_delta(&self) -> bool {
        self.event_type == "content_block_delta"
            && self
                .delta
                .as_ref()
                .and_then(|d| d.delta_type.as_deref())
                .map(|t| t == "text_delta")
                .unwrap_or(false)
    }

    /// Extract text from the event if available
    pub fn text(&self) -> Option<&str> {
        self.delta.as_ref()?.text.as_deref()
    }
}

/// Helper struct for building blocks during streaming
#[derive(Debug)]
struct BlockBuilder {
    block_type: String,
    id: Option<String>,
    name: Option<String>,
    accumulated: String,
}

impl BlockBuilder {
    fn finish(self) -> Result<Option<ContentBlock>> {
        match self.block_type.as_str() {
            // The endpoint rejects empty text blocks when they are sent back
            "text" if self.accumulated.is_empty() => Ok(None),
            "text" => Ok(Some(ContentBlock::Text {
                text: self.accumulated,
            })),
            "tool_use" => {
                let input = parse_tool_input(&self.accumulated)?;
                let id = self.id.context("tool_use block without id")?;
                let name = self.name.context("tool_use block without name")?;
                Ok(Some(ContentBlock::ToolUse { id, name, input }))
            }
            other => {
                tracing::debug!("Dropping unsupported content block type '{}'", other);
                Ok(None)
            }
        }
    }
}

/// Tool input arrives as JSON fragments; an empty buffer means `{}`
fn parse_tool_input(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw).context("Malformed tool input JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("Tool input must be a JSON object, got {}", other),
    }
}

/// Folds one response's events into a `CompletionResult`
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    open: BTreeMap<usize, BlockBuilder>,
    finished: BTreeMap<usize, ContentBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    message_id: Option<String>,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `message_stop` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one raw SSE line. Returns the text fragment to show live, if any.
    pub fn push_line(&mut self, line: &str) -> Result<Option<String>> {
        // SSE format: "data: {...}"; "event:" lines repeat the type and are ignored
        let Some(json_str) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let json_str = json_str.trim();
        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(None);
        }

        let event: StreamEvent = serde_json::from_str(json_str)
            .with_context(|| format!("Failed to parse stream event: {}", json_str))?;
        self.apply(event)
    }

    /// Apply one parsed event
    pub fn apply(&mut self, event: StreamEvent) -> Result<Option<String>> {
        tracing::debug!("Stream event: {}", event.event_type);

        match event.event_type.as_str() {
            "message_start" => {
                if let Some(message) = event.message {
                    self.message_id = message.id;
                    if let Some(usage) = message.usage {
                        self.usage.input_tokens = usage.input_tokens;
                        self.usage.output_tokens = usage.output_tokens;
                    }
                }
            }

            "content_block_start" => {
                let cb = event
                    .content_block
                    .context("content_block_start without content_block")?;
                let index = event.index.unwrap_or(0);
                let initial = cb.text.unwrap_or_default();
                self.open.insert(
                    index,
                    BlockBuilder {
                        block_type: cb.block_type,
                        id: cb.id,
                        name: cb.name,
                        accumulated: String::new(),
                    },
                );
                if !initial.is_empty() {
                    if let Some(builder) = self.open.get_mut(&index) {
                        builder.accumulated.push_str(&initial);
                    }
                    return Ok(Some(initial));
                }
            }

            "content_block_delta" => {
                let index = event.index.unwrap_or(0);
                let builder = self
                    .open
                    .get_mut(&index)
                    .ok_or_else(|| anyhow!("Delta for unknown content block {}", index))?;
                if let Some(delta) = event.delta {
                    match delta.delta_type.as_deref() {
                        Some("text_delta") => {
                            if let Some(text) = delta.text {
                                builder.accumulated.push_str(&text);
                                return Ok(Some(text));
                            }
                        }
                        Some("input_json_delta") => {
                            if let Some(json) = delta.partial_json {
                                builder.accumulated.push_str(&json);
                            }
                        }
                        _ => {}
                    }
                }
            }

            "content_block_stop" => {
                let index = event.index.unwrap_or(0);
                if let Some(builder) = self.open.remove(&index) {
                    if let Some(block) = builder.finish()? {
                        self.finished.insert(index, block);
                    }
                }
            }

            "message_delta" => {
                if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                    self.stop_reason = Some(StopReason::from_wire(&reason));
                }
                if let Some(usage) = event.usage {
                    self.usage.output_tokens = usage.output_tokens;
                }
            }

            "message_stop" => {
                self.done = true;
            }

            "error" => {
                let error = event.error.unwrap_or(StreamError {
                    error_type: "unknown".to_string(),
                    message: String::new(),
                });
                bail!("Stream error ({}): {}", error.error_type, error.message);
            }

            // ping and future event types
            _ => {}
        }

        Ok(None)
    }

    /// Produce the final message once the stream has completed
    pub fn finish(self) -> Result<CompletionResult> {
        if !self.done {
            bail!("Stream ended before message_stop");
        }
        if !self.open.is_empty() {
            bail!("Stream ended with {} unterminated content block(s)", self.open.len());
        }
        let stop_reason = self
            .stop_reason
            .unwrap_or_else(|| StopReason::Other("unknown".to_string()));

        tracing::debug!(
            "Completed message {:?}: {} block(s), stop_reason={}",
            self.message_id,
            self.finished.len(),
            stop_reason
        );

        Ok(CompletionResult {
            content: self.finished.into_values().collect(),
            stop_reason,
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acc: &mut StreamAccumulator, lines: &[&str]) -> String {
        let mut shown = String::new();
        for line in lines {
            if let Some(text) = acc.push_line(line).unwrap() {
                shown.push_str(&text);
            }
        }
        shown
    }

    #[test]
    fn test_parse_text_delta() {
        let json = r#"{
            "type": "content_block_delta",
            "index": 0,
            "delta": {
                "type": "text_delta",
                "text": "Hello"
            }
        }"#;

        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert!(event.is_text_delta());
        assert_eq!(event.text(), Some("Hello"));
    }

    #[test]
    fn test_parse_non_text_event() {
        let json = r#"{
            "type": "message_start",
            "message": {}
        }"#;

        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert!(!event.is_text_delta());
        assert_eq!(event.text(), None);
    }

    #[test]
    fn test_accumulates_text_and_tool_use() {
        let mut acc = StreamAccumulator::new();
        let shown = feed(
            &mut acc,
            &[
                "event: message_start",
                r#"data: {"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":12,"output_tokens":1}}}"#,
                "",
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Pinging "}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"echo."}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
                r#"data: {"type":"ping"}"#,
                r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"everything1__echo","input":{}}}"#,
                r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"msg\": \"hel"}}"#,
                r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"lo\"}"}}"#,
                r#"data: {"type":"content_block_stop","index":1}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":40}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );

        assert_eq!(shown, "Pinging echo.");
        assert!(acc.is_done());
        let result = acc.finish().unwrap();
        assert_eq!(result.stop_reason, StopReason::ToolUse);
        assert_eq!(result.usage.input_tokens, 12);
        assert_eq!(result.usage.output_tokens, 40);
        assert_eq!(result.content.len(), 2);
        assert_eq!(result.content[0].as_text(), Some("Pinging echo."));
        let tool_use = result.content[1].as_tool_use().unwrap();
        assert_eq!(tool_use.id, "toolu_1");
        assert_eq!(tool_use.name, "everything1__echo");
        assert_eq!(tool_use.input["msg"], "hello");
    }

    #[test]
    fn test_tool_use_without_input_deltas_is_empty_object() {
        let mut acc = StreamAccumulator::new();
        feed(
            &mut acc,
            &[
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_2","name":"ns__list","input":{}}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );
        let result = acc.finish().unwrap();
        assert!(result.content[0].as_tool_use().unwrap().input.is_empty());
    }

    #[test]
    fn test_error_event_fails() {
        let mut acc = StreamAccumulator::new();
        let err = acc
            .push_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("overloaded_error"));
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut acc = StreamAccumulator::new();
        feed(
            &mut acc,
            &[
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}"#,
            ],
        );
        assert!(acc.finish().is_err());
    }

    #[test]
    fn test_malformed_tool_input_fails() {
        let mut acc = StreamAccumulator::new();
        feed(
            &mut acc,
            &[
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_3","name":"ns__x","input":{}}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"[1, 2]"}}"#,
            ],
        );
        assert!(acc
            .push_line(r#"data: {"type":"content_block_stop","index":0}"#)
            .is_err());
    }

    #[test]
    fn test_empty_text_block_is_dropped() {
        let mut acc = StreamAccumulator::new();
        feed(
            &mut acc,
            &[
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
                r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_4","name":"ns__list","input":{}}}"#,
                r#"data: {"type":"content_block_stop","index":1}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );
        let result = acc.finish().unwrap();
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.content[0].as_tool_use().unwrap().id, "toolu_4");
    }

    #[test]
    fn test_unsupported_blocks_are_dropped() {
        let mut acc = StreamAccumulator::new();
        feed(
            &mut acc,
            &[
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
                r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"text","text":"ok"}}"#,
                r#"data: {"type":"content_block_stop","index":1}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );
        let result = acc.finish().unwrap();
        assert_eq!(result.content, vec![ContentBlock::text("ok")]);
        assert_eq!(result.stop_reason, StopReason::EndTurn);
    }
}
