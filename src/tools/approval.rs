// Human approval gate for tool calls
//
// Every tool use is presented to an approver before it runs. The terminal
// approver asks on stderr and reads the answer from stdin; "always" is
// remembered per tool for the rest of the process.

use anyhow::Context;
use async_trait::async_trait;
use crossterm::style::Stylize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Mutex;

use super::types::ToolUse;
use crate::errors::AgentError;

/// Outcome of one approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub approved: bool,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self { approved: true }
    }

    pub fn deny() -> Self {
        Self { approved: false }
    }
}

/// Operator answer at the terminal prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Yes,
    No,
    Always,
}

impl PromptResponse {
    /// Anything unrecognised counts as a refusal
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => PromptResponse::Yes,
            "a" | "always" => PromptResponse::Always,
            _ => PromptResponse::No,
        }
    }
}

/// Decides whether a tool use may run
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, tool_use: &ToolUse, signature: &str) -> Result<ApprovalDecision, AgentError>;
}

/// Approves everything (`--yes`)
#[derive(Debug, Default)]
pub struct AutoApprover;

#[async_trait]
impl Approver for AutoApprover {
    async fn approve(&self, tool_use: &ToolUse, _signature: &str) -> Result<ApprovalDecision, AgentError> {
        tracing::debug!("Auto-approving tool '{}'", tool_use.name);
        Ok(ApprovalDecision::approve())
    }
}

/// Prompts the operator on the terminal
#[derive(Debug, Default)]
pub struct TerminalApprover {
    /// Tools the operator answered "always" for
    always_allowed: Mutex<HashSet<String>>,
}

impl TerminalApprover {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_always_allowed(&self, tool_name: &str) -> bool {
        self.always_allowed
            .lock()
            .map(|set| set.contains(tool_name))
            .unwrap_or(false)
    }

    fn remember(&self, tool_name: &str) {
        if let Ok(mut set) = self.always_allowed.lock() {
            set.insert(tool_name.to_string());
        }
    }

    /// Print the prompt and block on one line of stdin
    fn prompt_user(signature: &str) -> anyhow::Result<PromptResponse> {
        eprint!(
            "\n{} {}? {} ",
            "Run".bold().yellow(),
            signature,
            "[y]es / [n]o / [a]lways:".dim()
        );
        io::stderr().flush()?;

        let mut response = String::new();
        let bytes = io::stdin()
            .read_line(&mut response)
            .context("Failed to read approval from stdin")?;
        if bytes == 0 {
            anyhow::bail!("stdin closed while waiting for approval");
        }

        Ok(PromptResponse::parse(&response))
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn approve(&self, tool_use: &ToolUse, signature: &str) -> Result<ApprovalDecision, AgentError> {
        if self.is_always_allowed(&tool_use.name) {
            tracing::debug!("Tool '{}' approved for this session", tool_use.name);
            return Ok(ApprovalDecision::approve());
        }

        let signature = signature.to_string();
        let response = tokio::task::spawn_blocking(move || Self::prompt_user(&signature))
            .await
            .map_err(|e| AgentError::Approval(anyhow::anyhow!("approval prompt task failed: {}", e)))?
            .map_err(AgentError::Approval)?;

        tracing::info!("Approval for '{}': {:?}", tool_use.name, response);

        Ok(match response {
            PromptResponse::Yes => ApprovalDecision::approve(),
            PromptResponse::Always => {
                self.remember(&tool_use.name);
                ApprovalDecision::approve()
            }
            PromptResponse::No => ApprovalDecision::deny(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_prompt_response_parsing() {
        assert_eq!(PromptResponse::parse("y\n"), PromptResponse::Yes);
        assert_eq!(PromptResponse::parse(" YES "), PromptResponse::Yes);
        assert_eq!(PromptResponse::parse("a"), PromptResponse::Always);
        assert_eq!(PromptResponse::parse("always"), PromptResponse::Always);
        assert_eq!(PromptResponse::parse("n"), PromptResponse::No);
        assert_eq!(PromptResponse::parse(""), PromptResponse::No);
        assert_eq!(PromptResponse::parse("sure"), PromptResponse::No);
    }

    #[tokio::test]
    async fn test_auto_approver() {
        let tool_use = ToolUse {
            id: "toolu_1".to_string(),
            name: "ns__echo".to_string(),
            input: Map::new(),
        };
        let decision = AutoApprover.approve(&tool_use, "ns__echo()").await.unwrap();
        assert!(decision.approved);
    }

    #[tokio::test]
    async fn test_remembered_tool_skips_prompt() {
        let approver = TerminalApprover::new();
        approver.remember("ns__echo");

        let tool_use = ToolUse {
            id: "toolu_1".to_string(),
            name: "ns__echo".to_string(),
            input: Map::new(),
        };
        let decision = approver.approve(&tool_use, "ns__echo()").await.unwrap();
        assert!(decision.approved);
        assert!(!approver.is_always_allowed("ns__other"));
    }
}
