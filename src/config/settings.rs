// Configuration structs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::agent::DEFAULT_MAX_TURNS;
use crate::claude::DEFAULT_BASE_URL;
use crate::errors::AgentError;
use crate::tools::mcp::McpServerConfig;
use crate::tools::NAMESPACE_SEPARATOR;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI that combines direct help with friendly conversation. Share your knowledge openly, explain concepts thoroughly, and use tools when helpful. Focus on substance over process - engage naturally while delivering quality assistance.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Model id sent with every completion request
    #[serde(default = "default_model")]
    pub model: String,

    /// Output token limit per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Completion calls allowed per user query
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,

    /// Claude API key; `ANTHROPIC_API_KEY` takes precedence
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Log file; defaults to `<tmp>/aterm.log`
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Tool sessions keyed by namespace
    #[serde(alias = "mcpServers")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

fn default_system_prompt() -> Option<String> {
    Some(DEFAULT_SYSTEM_PROMPT.to_string())
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_turns: default_max_turns(),
            system_prompt: default_system_prompt(),
            api_key: String::new(),
            base_url: default_base_url(),
            log_file: None,
            mcp_servers: BTreeMap::new(),
        }
    }
}

/// Values given on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub max_turns: Option<usize>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            ..Self::default()
        }
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(model) = overrides.model {
            self.model = model;
        }
        if let Some(max_turns) = overrides.max_turns {
            self.max_turns = max_turns;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = Some(log_file);
        }
    }

    /// Log file path, falling back to the temp directory
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("aterm.log"))
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.model.trim().is_empty() {
            return Err(AgentError::Config("model must not be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(AgentError::Config("max_tokens must be at least 1".to_string()));
        }
        if self.max_turns == 0 {
            return Err(AgentError::Config("max_turns must be at least 1".to_string()));
        }

        for (namespace, server) in &self.mcp_servers {
            if namespace.is_empty() {
                return Err(AgentError::Config("MCP server namespace must not be empty".to_string()));
            }
            if namespace.contains(NAMESPACE_SEPARATOR) {
                return Err(AgentError::Config(format!(
                    "MCP server namespace '{}' must not contain '{}'",
                    namespace, NAMESPACE_SEPARATOR
                )));
            }
            server
                .validate(namespace)
                .map_err(|e| AgentError::Config(e.to_string()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = Config::new("test-key".to_string());
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.max_tokens, 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            model: Some("claude-3-opus-latest".to_string()),
            max_turns: Some(2),
            log_file: None,
        });
        assert_eq!(config.model, "claude-3-opus-latest");
        assert_eq!(config.max_turns, 2);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_zero_max_turns_rejected() {
        let mut config = Config::default();
        config.max_turns = 0;
        assert!(matches!(config.validate(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_namespace_with_separator_rejected() {
        let mut config = Config::default();
        config
            .mcp_servers
            .insert("every__thing".to_string(), McpServerConfig::new("npx", vec![]));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("every__thing"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut config = Config::default();
        config
            .mcp_servers
            .insert("everything1".to_string(), McpServerConfig::new("", vec![]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_path_default() {
        let config = Config::default();
        assert!(config.log_path().ends_with("aterm.log"));
    }
}
