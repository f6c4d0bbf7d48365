//! Built-in processes

pub mod console;
pub mod messages;

pub use console::{ConsoleProcess, ConsoleSettings};
pub use messages::{MessageHandler, MessageHandlers, MessagesProcess, MessagesSettings, Severity};
