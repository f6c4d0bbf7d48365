//! Operator-facing text output
//!
//! Console replies, help listings and status dumps go to a [`MessageSink`].
//! This is separate from logging: logs are for developers and may be
//! compiled out, sink output is part of the console protocol.

use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;

/// Destination for console text
pub trait MessageSink {
    fn write_str(&mut self, text: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn write_str(&mut self, _text: &str) {}
}

/// Writes to standard output
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[cfg(feature = "std")]
impl MessageSink for StdoutSink {
    fn write_str(&mut self, text: &str) {
        use std::io::Write;
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Collects output in a shared string
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    text: Rc<RefCell<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.text.borrow().clone()
    }

    /// Return and clear everything written so far.
    pub fn take(&self) -> String {
        core::mem::take(&mut *self.text.borrow_mut())
    }
}

impl MessageSink for MemorySink {
    fn write_str(&mut self, text: &str) {
        self.text.borrow_mut().push_str(text);
    }
}
