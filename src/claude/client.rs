// HTTP client for Claude API

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use std::time::Duration;

use super::streaming::StreamAccumulator;
use super::types::{CompletionResult, Message, MessageRequest};
use super::CompletionDriver;
use crate::agent::Observer;
use crate::config::Config;
use crate::errors::AgentError;
use crate::tools::types::ToolDefinition;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 600;
const CONNECT_TIMEOUT_SECS: u64 = 30;

pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    system_prompt: Option<String>,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            max_tokens: 8192,
            system_prompt: None,
        })
    }

    /// Build a client from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.api_key.clone(), config.model.clone())?
            .with_base_url(config.base_url.clone())
            .with_max_tokens(config.max_tokens)
            .with_system_prompt(config.system_prompt.clone()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one streaming request and fold the SSE stream into a final message
    async fn stream_message(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        observer: &dyn Observer,
    ) -> Result<CompletionResult> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: self.system_prompt.as_deref(),
            messages,
            tools,
            stream: true,
        };

        tracing::debug!(
            "Sending streaming request to Claude API: {} message(s), {} tool(s)",
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(format!("{}{}", self.base_url, MESSAGES_PATH))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send streaming request to Claude API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Claude API streaming request failed\n\nStatus: {}\nBody: {}",
                status,
                error_body
            );
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut accumulator = StreamAccumulator::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.context("Claude API stream interrupted")?;
            buffer.extend_from_slice(&bytes);

            // Parse line by line
            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let line = String::from_utf8_lossy(&line_bytes);
                if let Some(text) = accumulator.push_line(line.trim_end_matches(['\r', '\n']))? {
                    observer.text_delta(&text);
                }
            }

            if accumulator.is_done() {
                break;
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer);
            if let Some(text) = accumulator.push_line(line.trim_end())? {
                observer.text_delta(&text);
            }
        }

        let result = accumulator.finish()?;
        tracing::info!(
            "Completion finished: stop_reason={}, input_tokens={}, output_tokens={}",
            result.stop_reason,
            result.usage.input_tokens,
            result.usage.output_tokens
        );
        Ok(result)
    }
}

#[async_trait]
impl CompletionDriver for ClaudeClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        observer: &dyn Observer,
    ) -> Result<CompletionResult, AgentError> {
        self.stream_message(messages, tools, observer)
            .await
            .map_err(AgentError::UpstreamCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ClaudeClient::new("test-key".to_string(), "claude-3-5-sonnet-latest");
        assert!(client.is_ok());
    }

    #[test]
    fn test_builder_normalizes_settings() {
        let client = ClaudeClient::new("test-key".to_string(), "m")
            .unwrap()
            .with_base_url("http://127.0.0.1:9999/")
            .with_system_prompt(Some("   ".to_string()))
            .with_max_tokens(64);
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
        assert!(client.system_prompt.is_none());
        assert_eq!(client.max_tokens, 64);
        assert_eq!(client.model(), "m");
    }
}
