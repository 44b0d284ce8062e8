// Orchestration core: conversation state and the turn-bounded tool-use loop

pub mod controller;
pub mod conversation;
pub mod observer;

pub use controller::{TurnController, TurnOutcome, DEFAULT_MAX_TURNS};
pub use conversation::ConversationHistory;
pub use observer::{Observer, SilentObserver};
