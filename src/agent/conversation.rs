// Conversation history exchanged with the completion endpoint
//
// Append-only during a cycle. Tool results are checked against the tool uses
// of the latest assistant turn so no orphan result ever reaches the endpoint.

use std::collections::HashSet;

use crate::claude::{ContentBlock, Message, Role};
use crate::errors::AgentError;
use crate::tools::types::ToolUse;

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user query
    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Add a completed assistant turn
    pub fn add_assistant_message(&mut self, message: Message) {
        debug_assert_eq!(message.role, Role::Assistant);
        self.messages.push(message);
    }

    /// Answer one pending tool use of the latest assistant turn
    pub fn add_tool_result(
        &mut self,
        tool_use_id: &str,
        content: impl Into<String>,
        is_error: bool,
    ) -> Result<(), AgentError> {
        if !self.pending_tool_use_ids().contains(tool_use_id) {
            return Err(AgentError::OrphanToolResult(tool_use_id.to_string()));
        }
        self.messages
            .push(Message::tool_result(tool_use_id, content, is_error));
        Ok(())
    }

    /// Tool uses of the most recent assistant turn, in emitted order
    pub fn latest_tool_uses(&self) -> Vec<ToolUse> {
        self.last_assistant_index()
            .map(|idx| self.messages[idx].tool_uses())
            .unwrap_or_default()
    }

    /// Ids from the latest assistant turn that have no result yet
    pub fn pending_tool_use_ids(&self) -> HashSet<String> {
        let Some(idx) = self.last_assistant_index() else {
            return HashSet::new();
        };

        let mut pending: HashSet<String> = self.messages[idx]
            .tool_uses()
            .into_iter()
            .map(|tool_use| tool_use.id)
            .collect();

        for message in &self.messages[idx + 1..] {
            for block in &message.content {
                if let ContentBlock::ToolResult { tool_use_id, .. } = block {
                    pending.remove(tool_use_id);
                }
            }
        }
        pending
    }

    fn last_assistant_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == Role::Assistant)
    }

    /// Get all messages for API request
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Total number of turns, usable as a rollback checkpoint
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Roll back to a checkpoint taken with `len()`
    pub fn truncate(&mut self, checkpoint: usize) {
        self.messages.truncate(checkpoint);
    }

    /// Clear conversation history (start fresh)
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
