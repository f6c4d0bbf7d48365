//! Self-describing commands over typed field buffers
//!
//! ## Overview
//!
//! A [`Command`] is a named operation with an ordered list of typed
//! [`CommandItem`]s and an action. Invocations carry their arguments in a
//! [`CommandBuffer`]: one slot per item, index-aligned with the item list,
//! every slot starting out unset so that default population can tell which
//! fields the caller supplied.
//!
//! The same buffer feeds three surfaces:
//!
//! - **local execution**: the action reads typed values from the buffer
//! - **remote redirection**: when a destination is given, the buffer is
//!   serialized into a JSON envelope and handed to the remote publisher; the
//!   action does not run
//! - **inbound execution**: a JSON envelope received from elsewhere is parsed
//!   back into a buffer and executed locally
//!
//! ## Envelope shape
//!
//! ```json
//! {"console":{"reporttext":{"text":"hello","pre":"","post":""}},"to":"kitchen"}
//! ```
//!
//! Field values are written as text. Inbound envelopes may also use native
//! JSON numbers and booleans.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Write;

use serde_json::{json, Map, Value};

use crate::constants::{NUMBER_INPUT_LENGTH, TEXT_INPUT_LENGTH};
use crate::errors::{CommandError, CommandResult};
use crate::field::{self, DefaultValue, FieldKind, FieldValue, Validator};
use crate::kernel::Kernel;

/// One typed argument of a command
#[derive(Debug, Clone, Copy)]
pub struct CommandItem {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
    pub max_len: usize,
    pub validator: Option<Validator>,
    /// Value used when the caller leaves the field unset
    pub default: Option<DefaultValue>,
}

impl CommandItem {
    const fn of(kind: FieldKind, name: &'static str, description: &'static str, max_len: usize) -> Self {
        Self { name, description, kind, max_len, validator: None, default: None }
    }

    pub const fn text(name: &'static str, description: &'static str) -> Self {
        Self::of(FieldKind::Text, name, description, TEXT_INPUT_LENGTH)
    }

    pub const fn int(name: &'static str, description: &'static str) -> Self {
        Self::of(FieldKind::Int, name, description, NUMBER_INPUT_LENGTH)
    }

    pub const fn float(name: &'static str, description: &'static str) -> Self {
        Self::of(FieldKind::Float, name, description, NUMBER_INPUT_LENGTH)
    }

    pub const fn yes_no(name: &'static str, description: &'static str) -> Self {
        Self::of(FieldKind::Bool, name, description, NUMBER_INPUT_LENGTH)
    }

    pub const fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub const fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "desc": self.description,
            "type": self.kind.name(),
        })
    }
}

/// Action run for a locally executed command
pub type CommandAction = fn(&mut Kernel, &CommandBuffer) -> CommandResult<()>;

/// A named, self-describing operation
#[derive(Debug, Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub description: &'static str,
    pub items: &'static [CommandItem],
    pub action: CommandAction,
}

impl Command {
    /// Index and item for a field name, ignoring case.
    pub fn item(&self, name: &str) -> Option<(usize, &'static CommandItem)> {
        self.items
            .iter()
            .enumerate()
            .find(|(_, item)| item.name.eq_ignore_ascii_case(name))
    }

    pub fn to_json(&self) -> Value {
        let items: Vec<Value> = self.items.iter().map(CommandItem::to_json).collect();
        json!({
            "name": self.name,
            "desc": self.description,
            "items": items,
        })
    }
}

/// Commands offered by one process
#[derive(Debug, Clone, Copy)]
pub struct CommandCollection {
    pub description: &'static str,
    pub commands: &'static [Command],
}

impl CommandCollection {
    pub fn find(&self, name: &str) -> Option<&'static Command> {
        self.commands.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// JSON schema for every command, labelled with the owning process.
    pub fn to_json(&self, process: &str) -> Value {
        let commands: Vec<Value> = self.commands.iter().map(Command::to_json).collect();
        json!({
            "name": process,
            "desc": self.description,
            "commands": commands,
        })
    }

    /// Text schema for every command.
    pub fn describe_text(&self, process: &str, out: &mut String) {
        let _ = writeln!(out, "{}: {}", process, self.description);
        for command in self.commands {
            let _ = writeln!(out, "    {}: {}", command.name, command.description);
            for item in command.items {
                let _ = writeln!(
                    out,
                    "        {} ({}): {}",
                    item.name,
                    item.kind.name(),
                    item.description
                );
            }
        }
    }
}

/// Argument buffer for one invocation
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    command: &'static Command,
    values: Vec<Option<FieldValue>>,
}

impl CommandBuffer {
    /// Buffer with every field unset.
    pub fn new(command: &'static Command) -> Self {
        let mut values = Vec::with_capacity(command.items.len());
        values.resize(command.items.len(), None);
        Self { command, values }
    }

    pub fn command(&self) -> &'static Command {
        self.command
    }

    fn slot(&self, name: &str) -> CommandResult<(usize, &'static CommandItem)> {
        self.command
            .item(name)
            .ok_or_else(|| CommandError::UnknownField(name.to_string()))
    }

    /// Parse and validate text into the named field.
    pub fn set_text(&mut self, name: &str, text: &str) -> CommandResult<()> {
        let (index, item) = self.slot(name)?;
        let value = field::parse_validated(item.kind, text, item.max_len, item.validator)
            .map_err(|reason| CommandError::InvalidValue { field: item.name, reason })?;
        self.values[index] = Some(value);
        Ok(())
    }

    /// Convert a JSON scalar into the named field.
    pub fn set_json(&mut self, name: &str, json: &Value) -> CommandResult<()> {
        let (index, item) = self.slot(name)?;
        let value = item
            .kind
            .from_json(json, item.max_len)
            .and_then(|value| field::check(value, item.validator))
            .map_err(|reason| CommandError::InvalidValue { field: item.name, reason })?;
        self.values[index] = Some(value);
        Ok(())
    }

    /// Store an already-typed value, checking kind and validator.
    pub fn set_value(&mut self, name: &str, value: FieldValue) -> CommandResult<()> {
        let (index, item) = self.slot(name)?;
        if value.kind() != item.kind {
            return Err(CommandError::InvalidValue {
                field: item.name,
                reason: crate::errors::FieldError::Unparseable { expected: item.kind.name() },
            });
        }
        let value = field::check(value, item.validator)
            .map_err(|reason| CommandError::InvalidValue { field: item.name, reason })?;
        self.values[index] = Some(value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let (index, _) = self.command.item(name)?;
        self.values[index].as_ref()
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(FieldValue::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(FieldValue::as_float)
    }

    pub fn yes_no(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    /// Fill unset fields from their defaults.
    ///
    /// Fails on the first unset field that has no default.
    pub fn populate_defaults(&mut self) -> CommandResult<()> {
        for (slot, item) in self.values.iter_mut().zip(self.command.items) {
            if slot.is_some() {
                continue;
            }
            match item.default {
                Some(default) => *slot = Some(default()),
                None => return Err(CommandError::MissingField(item.name)),
            }
        }
        Ok(())
    }

    /// Set fields as `field: "text"` pairs.
    pub fn fields_json(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        for (slot, item) in self.values.iter().zip(self.command.items) {
            if let Some(value) = slot {
                fields.insert(item.name.to_string(), Value::String(value.to_string()));
            }
        }
        fields
    }

    /// Envelope addressing this invocation to `process` on `destination`.
    pub fn envelope(&self, process: &str, destination: &str) -> Value {
        let mut command = Map::new();
        command.insert(self.command.name.to_string(), Value::Object(self.fields_json()));
        let mut envelope = Map::new();
        envelope.insert(process.to_string(), Value::Object(command));
        if !destination.is_empty() {
            envelope.insert("to".to_string(), Value::String(destination.to_string()));
        }
        Value::Object(envelope)
    }

    /// Buffer populated from an inbound JSON fields object.
    pub fn from_json(command: &'static Command, fields: &Value) -> CommandResult<Self> {
        let mut buffer = Self::new(command);
        match fields {
            Value::Object(map) => {
                for (name, value) in map {
                    buffer.set_json(name, value)?;
                }
            }
            Value::Null => {}
            _ => return Err(CommandError::MalformedMessage("command fields must be an object")),
        }
        Ok(buffer)
    }
}

/// A parsed inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub process: String,
    pub command: String,
    pub fields: Value,
    /// Device the envelope is addressed to, when given
    pub to: Option<String>,
}

impl InboundCommand {
    /// Parse `{"<process>":{"<command>":{fields}},"to":"<device>"}`.
    pub fn parse(text: &str) -> CommandResult<Self> {
        let json: Value = serde_json::from_str(text)
            .map_err(|_| CommandError::MalformedMessage("not valid JSON"))?;
        Self::from_value(&json)
    }

    pub fn from_value(json: &Value) -> CommandResult<Self> {
        let object = json
            .as_object()
            .ok_or(CommandError::MalformedMessage("envelope must be an object"))?;

        let to = match object.get("to") {
            Some(Value::String(to)) if !to.is_empty() => Some(to.clone()),
            Some(Value::String(_)) | None => None,
            Some(_) => return Err(CommandError::MalformedMessage("to must be a string")),
        };

        let mut targets = object.iter().filter(|(key, _)| key.as_str() != "to");
        let (process, body) = targets
            .next()
            .ok_or(CommandError::MalformedMessage("no process named"))?;
        if targets.next().is_some() {
            return Err(CommandError::MalformedMessage("more than one process named"));
        }

        let body = body
            .as_object()
            .ok_or(CommandError::MalformedMessage("process entry must be an object"))?;
        let mut commands = body.iter();
        let (command, fields) = commands
            .next()
            .ok_or(CommandError::MalformedMessage("no command named"))?;
        if commands.next().is_some() {
            return Err(CommandError::MalformedMessage("more than one command named"));
        }

        Ok(Self {
            process: process.clone(),
            command: command.clone(),
            fields: fields.clone(),
            to,
        })
    }
}
