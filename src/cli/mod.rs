// CLI module
// Public interface for command-line interface

mod input;
mod output;
mod repl;

pub use input::InputHandler;
pub use output::{truncate_for_display, TerminalObserver};
pub use repl::Repl;
