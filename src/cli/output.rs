// Terminal rendering of a running cycle

use crossterm::style::Stylize;
use std::io::{self, Write};

use crate::agent::Observer;
use crate::claude::CompletionResult;

/// Longest tool result echoed to the terminal before truncation
const MAX_RESULT_DISPLAY: usize = 2000;

/// Streams model text to stdout and reports tool activity
#[derive(Debug, Default)]
pub struct TerminalObserver;

impl TerminalObserver {
    pub fn new() -> Self {
        Self
    }
}

/// Cut long results at a char boundary
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... ({} more bytes)", &text[..idx], text.len() - idx),
        None => text.to_string(),
    }
}

impl Observer for TerminalObserver {
    fn text_delta(&self, text: &str) {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{}", text);
        let _ = stdout.flush();
    }

    fn tool_call(&self, signature: &str) {
        println!("\n{} {}", "tool:".cyan().bold(), signature);
    }

    fn tool_result(&self, text: &str, is_error: bool) {
        let shown = truncate_for_display(text, MAX_RESULT_DISPLAY);
        if is_error {
            println!("{} {}", "result:".red().bold(), shown);
        } else {
            println!("{} {}", "result:".green().bold(), shown);
        }
    }

    fn completion_finished(&self, _result: &CompletionResult) {
        println!();
    }
}
