// Tool dispatcher
//
// Runs the tool uses of the latest assistant turn in emitted order: approve,
// route to the owning session, call, fold the result back as a user turn.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::approval::Approver;
use super::registry::SessionRegistry;
use super::types::{CallToolResult, ToolUse};
use crate::agent::{ConversationHistory, Observer};
use crate::errors::AgentError;

/// Result text sent back when the operator refuses a call
pub const DENIAL_MESSAGE: &str = "Tool execution denied by user";

/// Result text for tool uses left unexecuted after a denial in the same turn
pub const SKIPPED_MESSAGE: &str = "Skipped: an earlier tool call in this turn was denied";

/// Prefix marking a result the session reported as failed
pub const ERROR_PREFIX: &str = "ERROR: ";

/// What one dispatch pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Tool calls that reached a session
    pub executed: usize,
    /// Whether the pass stopped at a denial
    pub denied: bool,
    /// Tool uses answered with `SKIPPED_MESSAGE` after a denial
    pub skipped: usize,
}

/// Normalize a session result into the text stored in the conversation
pub fn result_text(result: &CallToolResult) -> String {
    let text = result.joined_text();
    if result.is_error {
        format!("{}{}", ERROR_PREFIX, text)
    } else {
        text
    }
}

pub struct ToolExecutor {
    registry: Arc<SessionRegistry>,
    approver: Arc<dyn Approver>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<SessionRegistry>, approver: Arc<dyn Approver>) -> Self {
        Self { registry, approver }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Process every tool use of the most recent assistant turn
    #[instrument(skip_all)]
    pub async fn dispatch(
        &self,
        conversation: &mut ConversationHistory,
        observer: &dyn Observer,
    ) -> Result<DispatchSummary, AgentError> {
        let tool_uses = conversation.latest_tool_uses();
        let mut summary = DispatchSummary::default();

        for (position, tool_use) in tool_uses.iter().enumerate() {
            let signature = tool_use.signature();
            observer.tool_call(&signature);

            let decision = self.approver.approve(tool_use, &signature).await?;
            if !decision.approved {
                info!("Tool use '{}' denied", tool_use.name);
                conversation.add_tool_result(&tool_use.id, DENIAL_MESSAGE, true)?;
                observer.tool_result(DENIAL_MESSAGE, true);

                // Every tool use must be answered before the next request
                for skipped in &tool_uses[position + 1..] {
                    conversation.add_tool_result(&skipped.id, SKIPPED_MESSAGE, true)?;
                    summary.skipped += 1;
                }
                if summary.skipped > 0 {
                    warn!("Skipped {} remaining tool use(s) after denial", summary.skipped);
                }
                summary.denied = true;
                break;
            }

            let result = self.execute(tool_use).await?;
            let text = result_text(&result);
            conversation.add_tool_result(&tool_use.id, text.clone(), result.is_error)?;
            observer.tool_result(&text, result.is_error);
            summary.executed += 1;
        }

        Ok(summary)
    }

    async fn execute(&self, tool_use: &ToolUse) -> Result<CallToolResult, AgentError> {
        let (handle, local_name) = self.registry.resolve(&tool_use.name)?;
        debug!(
            "Calling '{}' on session '{}' (tool_use_id={})",
            local_name,
            handle.namespace(),
            tool_use.id
        );

        let result = handle
            .session()
            .call_tool(local_name, tool_use.input.clone())
            .await
            .map_err(|source| AgentError::Session {
                namespace: handle.namespace().to_string(),
                source,
            })?;

        if result.is_error {
            warn!("Tool '{}' reported an error", tool_use.name);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_text_success() {
        assert_eq!(result_text(&CallToolResult::success("hello")), "hello");
    }

    #[test]
    fn test_result_text_error_prefix() {
        assert_eq!(result_text(&CallToolResult::error("not found")), "ERROR: not found");
    }

    #[test]
    fn test_result_text_empty_error() {
        let result = CallToolResult {
            content: vec![],
            is_error: true,
        };
        assert_eq!(result_text(&result), "ERROR: ");
    }
}
