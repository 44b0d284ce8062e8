// Claude API client module
// Public interface for interacting with Anthropic Claude API

mod client;
pub(crate) mod streaming;
pub mod types;

use async_trait::async_trait;

use crate::agent::Observer;
use crate::errors::AgentError;
use crate::tools::types::ToolDefinition;

pub use client::{ClaudeClient, DEFAULT_BASE_URL};
pub use streaming::{StreamAccumulator, StreamEvent};
pub use types::{CompletionResult, ContentBlock, Message, Role, StopReason, Usage};

/// Issues one completion request per turn
///
/// Text fragments are forwarded to the observer while the response streams;
/// the structured message is returned once the stream has completed.
#[async_trait]
pub trait CompletionDriver: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        observer: &dyn Observer,
    ) -> Result<CompletionResult, AgentError>;
}
