//! Serial console process
//!
//! ## Overview
//!
//! Assembles console lines from a [`LineSource`] and hands each completed
//! line to the kernel as a [`Request::ConsoleLine`]. Input is ignored while a
//! robot session owns the console. ESC cancels a running sensor test.
//!
//! As a listener target the console prints the message it receives. It also
//! offers the `reporttext`, `reportjson` and `remote` commands.

use alloc::format;
use alloc::string::{String, ToString};

use crate::commands::{Command, CommandBuffer, CommandCollection, CommandItem};
use crate::constants::{CONSOLE_BUFFER_SIZE, ESCAPE_CHAR};
use crate::entity::{Entity, Process, ProcessContext, Request};
use crate::errors::CommandResult;
use crate::field::FieldValue;
use crate::hal::LineSource;
use crate::kernel::Kernel;
use crate::listener::ListenerBuffer;
use crate::settings::SettingsBlock;
use crate::status::Status;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

crate::settings_block! {
    /// Settings for [`ConsoleProcess`]
    pub struct ConsoleSettings => "console", "Serial console" {
        echo: bool = true => "echoserial", "Echo serial input (yes or no)";
        autosave: bool = true => "autosavesettings", "Save settings after each change (yes or no)";
    }
}

fn empty_text() -> FieldValue {
    FieldValue::Text(String::new())
}

fn text_attribute() -> FieldValue {
    FieldValue::Text(String::from("text"))
}

static REPORT_TEXT_ITEMS: [CommandItem; 3] = [
    CommandItem::text("text", "Text to show"),
    CommandItem::text("pre", "Text shown before").with_default(empty_text),
    CommandItem::text("post", "Text shown after").with_default(empty_text),
];

static REPORT_JSON_ITEMS: [CommandItem; 2] = [
    CommandItem::text("text", "Text or JSON to show"),
    CommandItem::text("attr", "Attribute name").with_default(text_attribute),
];

static REMOTE_ITEMS: [CommandItem; 1] = [CommandItem::text("cmd", "Console command to run")];

fn report_text(kernel: &mut Kernel, buffer: &CommandBuffer) -> CommandResult<()> {
    let text = format!(
        "{}{}{}",
        buffer.text("pre").unwrap_or_default(),
        buffer.text("text").unwrap_or_default(),
        buffer.text("post").unwrap_or_default(),
    );
    kernel.display_message(&text);
    Ok(())
}

fn report_json(kernel: &mut Kernel, buffer: &CommandBuffer) -> CommandResult<()> {
    let text = buffer.text("text").unwrap_or_default();
    let attr = buffer.text("attr").unwrap_or("text");
    let json = if text.starts_with('{') {
        format!("{{\"{}\":{}}}", attr, text)
    } else {
        format!("{{\"{}\":{}}}", attr, serde_json::Value::String(text.to_string()))
    };
    kernel.display_message(&json);
    Ok(())
}

fn remote(kernel: &mut Kernel, buffer: &CommandBuffer) -> CommandResult<()> {
    let line = buffer.text("cmd").unwrap_or_default().to_string();
    kernel.perform_console_line(&line);
    Ok(())
}

static REMOTE_COMMANDS: CommandCollection = CommandCollection {
    description: "Console output and remote console access",
    commands: &[
        Command {
            name: "reporttext",
            description: "Show text on the console",
            items: &REPORT_TEXT_ITEMS,
            action: report_text,
        },
        Command {
            name: "reportjson",
            description: "Show text wrapped in a JSON attribute",
            items: &REPORT_JSON_ITEMS,
            action: report_json,
        },
        Command {
            name: "remote",
            description: "Run a console command",
            items: &REMOTE_ITEMS,
            action: remote,
        },
    ],
};

/// Serial console process
pub struct ConsoleProcess<L> {
    input: L,
    line: String,
    settings: ConsoleSettings,
}

impl<L: LineSource> ConsoleProcess<L> {
    pub fn new(input: L) -> Self {
        Self { input, line: String::new(), settings: ConsoleSettings::default() }
    }

    /// Bytes collected for the line in progress.
    pub fn pending_line(&self) -> &str {
        &self.line
    }

    fn accept(&mut self, byte: u8, ctx: &mut ProcessContext<'_>) {
        match byte {
            ESCAPE_CHAR => ctx.request(Request::CancelSensorTest),
            b'\n' | b'\r' | 0 => {
                if !self.line.is_empty() {
                    let line = core::mem::take(&mut self.line);
                    ctx.request(Request::ConsoleLine(line));
                }
                self.echo(b'\n');
            }
            BACKSPACE | DELETE => {
                if self.line.pop().is_some() {
                    self.echo(BACKSPACE);
                }
            }
            byte if byte.is_ascii() && !byte.is_ascii_control() => {
                if self.line.len() < CONSOLE_BUFFER_SIZE {
                    self.line.push(byte as char);
                    self.echo(byte);
                }
            }
            _ => {}
        }
    }

    fn echo(&mut self, byte: u8) {
        if self.settings.echo {
            self.input.echo(byte);
        }
    }
}

impl<L: LineSource> Entity for ConsoleProcess<L> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn settings(&self) -> Option<&dyn SettingsBlock> {
        Some(&self.settings)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
        Some(&mut self.settings)
    }
}

impl<L: LineSource> Process for ConsoleProcess<L> {
    fn commands(&self) -> Option<&'static CommandCollection> {
        Some(&REMOTE_COMMANDS)
    }

    fn start(&mut self, _ctx: &mut ProcessContext<'_>) -> Status {
        self.line.clear();
        Status::Ok
    }

    fn update(&mut self, status: Status, ctx: &mut ProcessContext<'_>) -> Status {
        if ctx.robot_session() {
            return status;
        }
        while let Some(byte) = self.input.next_byte() {
            self.accept(byte, ctx);
        }
        status
    }

    fn receive_message(&mut self, _destination: &str, buffer: &ListenerBuffer, ctx: &mut ProcessContext<'_>) {
        ctx.display(buffer.message());
    }
}
