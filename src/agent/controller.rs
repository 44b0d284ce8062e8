// Turn controller
//
// Drives completion / dispatch cycles for one user query under a turn cap.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::conversation::ConversationHistory;
use super::observer::Observer;
use crate::claude::{CompletionDriver, StopReason};
use crate::errors::AgentError;
use crate::tools::ToolExecutor;

/// Completion calls allowed per user query unless configured otherwise
pub const DEFAULT_MAX_TURNS: usize = 5;

/// How one query's cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Completion requests issued
    pub completions: usize,
    /// Assistant turns whose tool uses were dispatched
    pub tool_round_trips: usize,
    /// Stop reason of the last completion
    pub stop_reason: StopReason,
    /// The model still wanted tools when the cap ended the cycle
    pub cap_reached: bool,
}

pub struct TurnController {
    driver: Arc<dyn CompletionDriver>,
    executor: ToolExecutor,
    max_turns: usize,
}

impl TurnController {
    pub fn new(
        driver: Arc<dyn CompletionDriver>,
        executor: ToolExecutor,
        max_turns: usize,
    ) -> Result<Self, AgentError> {
        if max_turns == 0 {
            return Err(AgentError::Config("max_turns must be at least 1".to_string()));
        }
        Ok(Self {
            driver,
            executor,
            max_turns,
        })
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Append `query` and run until the model stops asking for tools or the cap is hit
    ///
    /// Errors propagate unchanged; whatever was appended before the error stays
    /// in `conversation`, so callers checkpoint with `len()` to roll back.
    pub async fn run(
        &self,
        conversation: &mut ConversationHistory,
        query: &str,
        observer: &dyn Observer,
    ) -> Result<TurnOutcome, AgentError> {
        conversation.add_user_message(query);
        let tools = self.executor.registry().tools();

        let mut outcome = TurnOutcome {
            completions: 0,
            tool_round_trips: 0,
            stop_reason: StopReason::EndTurn,
            cap_reached: false,
        };

        for turn_index in 0..self.max_turns {
            debug!("Turn {}/{}", turn_index + 1, self.max_turns);

            let result = self
                .driver
                .complete(conversation.messages(), tools, observer)
                .await?;
            outcome.completions += 1;
            observer.completion_finished(&result);

            let stop_reason = result.stop_reason.clone();
            let message = result.into_message();
            let has_tool_uses = message.has_tool_uses();
            if message.content.is_empty() {
                // An empty assistant turn would be rejected on every later request
                warn!("Completion returned no content; not recording an assistant turn");
            } else {
                conversation.add_assistant_message(message);
            }

            if has_tool_uses {
                let summary = self.executor.dispatch(conversation, observer).await?;
                outcome.tool_round_trips += 1;
                debug!("Dispatch summary: {:?}", summary);
            }

            outcome.stop_reason = stop_reason;
            if outcome.stop_reason != StopReason::ToolUse {
                break;
            }
            if !has_tool_uses {
                warn!("Completion stopped for tool_use without any tool use blocks");
                break;
            }
            if turn_index + 1 == self.max_turns {
                outcome.cap_reached = true;
                warn!("Turn cap of {} reached", self.max_turns);
            }
        }

        info!(
            "Query finished: completions={}, tool_round_trips={}, stop_reason={}, cap_reached={}",
            outcome.completions, outcome.tool_round_trips, outcome.stop_reason, outcome.cap_reached
        );
        Ok(outcome)
    }
}
