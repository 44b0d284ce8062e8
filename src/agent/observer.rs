// Progress callbacks for the operator-facing surface

use crate::claude::CompletionResult;

/// Receives streamed text and tool activity while a cycle runs
pub trait Observer: Send + Sync {
    /// A text fragment arrived from the completion stream
    fn text_delta(&self, text: &str);

    /// A tool use is about to be presented for approval
    fn tool_call(&self, signature: &str);

    /// A tool result was appended to the conversation
    fn tool_result(&self, text: &str, is_error: bool);

    /// One completion call finished
    fn completion_finished(&self, _result: &CompletionResult) {}
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl Observer for SilentObserver {
    fn text_delta(&self, _text: &str) {}

    fn tool_call(&self, _signature: &str) {}

    fn tool_result(&self, _text: &str, _is_error: bool) {}
}
