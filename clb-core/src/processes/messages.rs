//! Operator message switch and control messages
//!
//! Owns the `messagesactive` setting the kernel consults before showing
//! general messages. The process itself does nothing per tick.
//!
//! Control messages are numbered notices with a [`Severity`] that other
//! parts of the device (status pixels, a display) may want to mirror. The
//! kernel always shows them on the console and also passes them to up to
//! [`MAX_MESSAGE_HANDLERS`] bound [`MessageHandler`]s, in bind order.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use core::fmt;

use heapless::Vec as BoundedVec;

use crate::constants::MAX_MESSAGE_HANDLERS;
use crate::entity::{Entity, Process, ProcessContext};
use crate::errors::RegistryError;
use crate::settings::SettingsBlock;
use crate::status::Status;

crate::settings_block! {
    /// Settings for [`MessagesProcess`]
    pub struct MessagesSettings => "messages", "Message display" {
        active: bool = true => "messagesactive", "Messages enabled (yes or no)";
    }
}

#[derive(Debug, Default)]
pub struct MessagesProcess {
    settings: MessagesSettings,
}

impl MessagesProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Entity for MessagesProcess {
    fn name(&self) -> &'static str {
        "messages"
    }

    fn settings(&self) -> Option<&dyn SettingsBlock> {
        Some(&self.settings)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
        Some(&mut self.settings)
    }
}

impl Process for MessagesProcess {
    fn start(&mut self, _ctx: &mut ProcessContext<'_>) -> Status {
        if self.settings.active {
            Status::Ok
        } else {
            Status::Off
        }
    }
}

/// How urgent a control message is, mirrored as an indicator flash pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The device is still coming up
    Starting,
    Normal,
    /// Configuration mode
    Config,
    Alert,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Severity::Starting => "Starting",
            Severity::Normal => "OK",
            Severity::Config => "Config",
            Severity::Alert => "Alert",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Severity {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.label())
    }
}

/// Console form of a control message: `Alert: 3 door open`
pub fn format_control_message(number: i32, severity: Severity, text: &str) -> String {
    format!("{}: {} {}", severity, number, text)
}

/// Receiver of control messages
pub trait MessageHandler {
    fn control_message(&mut self, number: i32, severity: Severity, text: &str);
}

impl<F> MessageHandler for F
where
    F: FnMut(i32, Severity, &str),
{
    fn control_message(&mut self, number: i32, severity: Severity, text: &str) {
        self(number, severity, text)
    }
}

/// Fixed table of bound control message handlers
#[derive(Default)]
pub struct MessageHandlers {
    handlers: BoundedVec<Box<dyn MessageHandler>, MAX_MESSAGE_HANDLERS>,
}

impl MessageHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to the next free slot.
    pub fn bind(&mut self, handler: Box<dyn MessageHandler>) -> Result<(), RegistryError> {
        self.handlers
            .push(handler)
            .map_err(|_| RegistryError::HandlersFull(MAX_MESSAGE_HANDLERS))
    }

    /// Pass a message to every bound handler in bind order.
    pub fn dispatch(&mut self, number: i32, severity: Severity, text: &str) {
        for handler in self.handlers.iter_mut() {
            handler.control_message(number, severity, text);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for MessageHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandlers").field("bound", &self.handlers.len()).finish()
    }
}
