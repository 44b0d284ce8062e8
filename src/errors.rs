// Error taxonomy and user-friendly error messages
//
// `AgentError` is what crosses the seams between the registry, the completion
// driver, the dispatcher and the turn controller. The free functions format
// actionable messages for the operator.

use thiserror::Error;

/// Errors raised by the orchestration core
#[derive(Debug, Error)]
pub enum AgentError {
    /// A configured tool session failed to start or handshake
    #[error("failed to start tool session '{namespace}': {source:#}")]
    SessionInit {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    /// The completion request failed (network, HTTP status, model error)
    #[error("completion request failed: {0:#}")]
    UpstreamCompletion(#[source] anyhow::Error),

    /// A tool name does not belong to any registered namespace
    #[error("no registered tool session owns tool '{0}'")]
    Routing(String),

    /// The transport of a running tool session broke
    #[error("tool session '{namespace}' failed: {source:#}")]
    Session {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    /// The approval prompt could not produce a decision
    #[error("approval prompt failed: {0:#}")]
    Approval(#[source] anyhow::Error),

    /// A tool result did not answer a pending tool use of the latest assistant turn
    #[error("tool result '{0}' does not match a pending tool use")]
    OrphanToolResult(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operator interrupted the cycle
    #[error("interrupted")]
    Interrupted,
}

impl AgentError {
    /// Errors that end the current cycle but leave the process usable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::UpstreamCompletion(_)
                | AgentError::Routing(_)
                | AgentError::Session { .. }
                | AgentError::Approval(_)
        )
    }
}

/// Format a missing API key error with helpful suggestions
pub fn api_key_missing_error() -> String {
    "Anthropic API key is missing\n\n\
    \x1b[1;33mPossible causes:\x1b[0m\n\
    • ANTHROPIC_API_KEY is not exported\n\
    • \"api_key\" is not set in the config file\n\n\
    \x1b[1;32mTry:\x1b[0m\n\
    1. Export the key:\n\
       \x1b[36mexport ANTHROPIC_API_KEY=\"sk-ant-...\"\x1b[0m\n\n\
    2. Get a new API key:\n\
       • https://console.anthropic.com/"
        .to_string()
}

/// Format a config parse error with helpful suggestions
pub fn config_parse_error(path: &str, error: &str) -> String {
    format!(
        "Failed to parse config file {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check the file syntax:\n\
           \x1b[36mcat {}\x1b[0m\n\n\
        2. Common mistakes:\n\
           • Trailing commas in JSON\n\
           • \"mcp_servers\" is not an object keyed by namespace\n\
           • \"args\" is not an array of strings",
        path, error, path
    )
}

/// Format a session startup failure with helpful suggestions
pub fn session_start_error(error: &AgentError) -> String {
    format!(
        "{}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • The server command is not installed or not on PATH\n\
        • The server crashed during the MCP handshake\n\
        • The server took longer than startup_timeout_secs to answer\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Run the configured command by hand and check its output\n\
        2. Check the log file for the JSON-RPC exchange",
        error
    )
}
