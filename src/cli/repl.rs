// Read loop and one-shot driver around the turn controller

use anyhow::Result;
use crossterm::style::Stylize;
use tokio_util::sync::CancellationToken;

use super::input::InputHandler;
use super::output::TerminalObserver;
use crate::agent::{ConversationHistory, Observer, TurnController, TurnOutcome};
use crate::errors::AgentError;

const PROMPT: &str = "> ";

pub struct Repl {
    controller: TurnController,
    conversation: ConversationHistory,
    observer: Box<dyn Observer>,
    cancel: CancellationToken,
}

impl Repl {
    pub fn new(controller: TurnController, cancel: CancellationToken) -> Self {
        Self::with_observer(controller, cancel, Box::new(TerminalObserver::new()))
    }

    pub fn with_observer(
        controller: TurnController,
        cancel: CancellationToken,
        observer: Box<dyn Observer>,
    ) -> Self {
        Self {
            controller,
            conversation: ConversationHistory::new(),
            observer,
            cancel,
        }
    }

    pub fn conversation(&self) -> &ConversationHistory {
        &self.conversation
    }

    /// Run one query to completion
    ///
    /// On a recoverable error the conversation is rolled back to where it was
    /// before the query, so the next query starts from a consistent history.
    pub async fn ask(&mut self, query: &str) -> Result<TurnOutcome, AgentError> {
        let checkpoint = self.conversation.len();

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(AgentError::Interrupted),
            result = self.controller.run(&mut self.conversation, query, self.observer.as_ref()) => result,
        };

        if let Err(e) = &result {
            if e.is_recoverable() {
                tracing::warn!("Query failed, rolling back conversation: {}", e);
                self.conversation.truncate(checkpoint);
            }
        }
        result
    }

    /// Interactive mode: one query per prompt until Ctrl-C / Ctrl-D
    pub async fn run_interactive(&mut self) -> Result<()> {
        let mut input = InputHandler::new()?;

        println!(
            "{} ({} tool(s), up to {} turn(s) per query; Ctrl-D to exit)",
            "aterm".bold(),
            self.controller.executor().registry().tools().len(),
            self.controller.max_turns()
        );

        loop {
            let line = tokio::task::block_in_place(|| input.read_line(PROMPT))?;
            let Some(query) = line else {
                break;
            };

            match query.as_str() {
                "" => continue,
                "/quit" | "/exit" => break,
                "/clear" => {
                    self.conversation.clear();
                    println!("{}", "Conversation cleared".dim());
                    continue;
                }
                _ => {}
            }

            match self.ask(&query).await {
                Ok(outcome) => {
                    if outcome.cap_reached {
                        println!(
                            "{}",
                            format!("Stopped after {} turns", outcome.completions).yellow()
                        );
                    }
                }
                Err(e) if e.is_recoverable() => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
                Err(e) => {
                    let _ = input.save_history();
                    return Err(e.into());
                }
            }
        }

        input.save_history()?;
        Ok(())
    }

    /// One-shot mode: run a single query; any error is returned
    pub async fn run_one_shot(&mut self, query: &str) -> Result<TurnOutcome, AgentError> {
        println!("{}", query);
        self.ask(query).await
    }
}
