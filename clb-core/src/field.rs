//! Typed fields shared by settings and command buffers
//!
//! A field is a named slot holding one of four value kinds. The same
//! parse/format rules apply whether the slot lives in a persisted settings
//! block or in a transient command buffer, so text typed at the console,
//! values carried in JSON envelopes and stored records all agree.
//!
//! ## Text forms
//!
//! | Kind  | Accepted input                                   | Displayed as          |
//! |-------|--------------------------------------------------|-----------------------|
//! | Int   | decimal `i32`, surrounding whitespace ignored    | decimal               |
//! | Float | finite decimal `f32`                             | shortest exact form   |
//! | Bool  | yes/no, true/false, on/off, 1/0 (any case)       | `yes` / `no`          |
//! | Text  | anything up to the field's input limit           | verbatim              |
//!
//! Floats display in the shortest form that parses back to the same bits, so
//! a display followed by a parse is lossless.

use alloc::string::{String, ToString};
use core::fmt;

use serde_json::Value;

use crate::constants::{NUMBER_INPUT_LENGTH, TEXT_INPUT_LENGTH};
use crate::errors::FieldError;

/// Validator applied to a parsed value before it is stored
pub type Validator = fn(&FieldValue) -> bool;

/// Default provider for a field
pub type DefaultValue = fn() -> FieldValue;

/// Kind tag selecting parse and format behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
}

impl FieldKind {
    /// Name used in schema dumps.
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "yesNo",
            FieldKind::Text => "text",
        }
    }

    /// Parse `text` as this kind, enforcing `max_len` characters.
    pub fn parse(self, text: &str, max_len: usize) -> Result<FieldValue, FieldError> {
        let length = text.chars().count();
        if length > max_len {
            return Err(FieldError::TooLong { length, limit: max_len });
        }

        match self {
            FieldKind::Int => text
                .trim()
                .parse::<i32>()
                .map(FieldValue::Int)
                .map_err(|_| FieldError::Unparseable { expected: "integer" }),
            FieldKind::Float => match text.trim().parse::<f32>() {
                Ok(v) if v.is_finite() => Ok(FieldValue::Float(v)),
                _ => Err(FieldError::Unparseable { expected: "number" }),
            },
            FieldKind::Bool => parse_bool(text.trim())
                .map(FieldValue::Bool)
                .ok_or(FieldError::Unparseable { expected: "yes or no" }),
            FieldKind::Text => Ok(FieldValue::Text(text.to_string())),
        }
    }

    /// Convert a JSON scalar into this kind.
    ///
    /// Strings go through [`FieldKind::parse`]; native numbers and booleans
    /// are accepted when they fit the kind.
    pub fn from_json(self, value: &Value, max_len: usize) -> Result<FieldValue, FieldError> {
        match (self, value) {
            (_, Value::String(text)) => self.parse(text, max_len),
            (FieldKind::Int, Value::Number(n)) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(FieldValue::Int)
                .ok_or(FieldError::Unparseable { expected: "integer" }),
            (FieldKind::Float, Value::Number(n)) => match n.as_f64() {
                Some(v) if (v as f32).is_finite() => Ok(FieldValue::Float(v as f32)),
                _ => Err(FieldError::Unparseable { expected: "number" }),
            },
            (FieldKind::Bool, Value::Bool(b)) => Ok(FieldValue::Bool(*b)),
            (FieldKind::Text, Value::Number(n)) => self.parse(&n.to_string(), max_len),
            (FieldKind::Text, Value::Bool(b)) => self.parse(if *b { "yes" } else { "no" }, max_len),
            _ => Err(FieldError::Unparseable { expected: self.name() }),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    const TRUE: [&str; 4] = ["yes", "true", "on", "1"];
    const FALSE: [&str; 4] = ["no", "false", "off", "0"];

    if TRUE.iter().any(|t| t.eq_ignore_ascii_case(text)) {
        Some(true)
    } else if FALSE.iter().any(|f| f.eq_ignore_ascii_case(text)) {
        Some(false)
    } else {
        None
    }
}

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Text(_) => FieldKind::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Native JSON form of the value.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Int(v) => Value::from(*v),
            FieldValue::Float(v) => Value::from(*v as f64),
            FieldValue::Bool(v) => Value::Bool(*v),
            FieldValue::Text(v) => Value::String(v.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(true) => f.write_str("yes"),
            FieldValue::Bool(false) => f.write_str("no"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// Rust types that can back a typed field
///
/// Implemented for the four storage types a settings block may declare.
pub trait FieldType: Sized {
    /// Kind tag for this type
    const KIND: FieldKind;

    /// Default maximum input length
    const MAX_INPUT: usize;

    fn to_value(&self) -> FieldValue;

    /// Extract a value of this type, `None` on a kind mismatch.
    fn from_value(value: &FieldValue) -> Option<Self>;
}

impl FieldType for i32 {
    const KIND: FieldKind = FieldKind::Int;
    const MAX_INPUT: usize = NUMBER_INPUT_LENGTH;

    fn to_value(&self) -> FieldValue {
        FieldValue::Int(*self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_int()
    }
}

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::Float;
    const MAX_INPUT: usize = NUMBER_INPUT_LENGTH;

    fn to_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;
    const MAX_INPUT: usize = NUMBER_INPUT_LENGTH;

    fn to_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;
    const MAX_INPUT: usize = TEXT_INPUT_LENGTH;

    fn to_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_text().map(String::from)
    }
}

/// Parse `text` for a field and run its validator.
pub fn parse_validated(
    kind: FieldKind,
    text: &str,
    max_len: usize,
    validator: Option<Validator>,
) -> Result<FieldValue, FieldError> {
    let value = kind.parse(text, max_len)?;
    check(value, validator)
}

/// Run an optional validator over an already-typed value.
pub fn check(value: FieldValue, validator: Option<Validator>) -> Result<FieldValue, FieldError> {
    match validator {
        Some(validate) if !validate(&value) => Err(FieldError::Rejected),
        _ => Ok(value),
    }
}

/// Stock validators
pub mod validators {
    use super::FieldValue;

    /// Integers and floats strictly above zero.
    pub fn positive(value: &FieldValue) -> bool {
        match value {
            FieldValue::Int(v) => *v > 0,
            FieldValue::Float(v) => *v > 0.0,
            _ => false,
        }
    }

    /// Integers and floats at or above zero.
    pub fn non_negative(value: &FieldValue) -> bool {
        match value {
            FieldValue::Int(v) => *v >= 0,
            FieldValue::Float(v) => *v >= 0.0,
            _ => false,
        }
    }

    /// GPIO pin numbers the supported boards expose.
    pub fn pin_number(value: &FieldValue) -> bool {
        matches!(value, FieldValue::Int(v) if (0..=39).contains(v))
    }

    /// TCP/UDP port numbers.
    pub fn port_number(value: &FieldValue) -> bool {
        matches!(value, FieldValue::Int(v) if (1..=65535).contains(v))
    }

    /// Text usable inside an MQTT topic level: no wildcards, separators or
    /// whitespace.
    pub fn topic_safe(value: &FieldValue) -> bool {
        match value {
            FieldValue::Text(text) => text
                .chars()
                .all(|c| !c.is_whitespace() && !matches!(c, '#' | '+' | '/')),
            _ => false,
        }
    }

    /// Text that is not empty.
    pub fn non_empty(value: &FieldValue) -> bool {
        matches!(value, FieldValue::Text(text) if !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_accepts_common_spellings() {
        for text in ["yes", "YES", "true", "On", "1"] {
            assert_eq!(FieldKind::Bool.parse(text, 20), Ok(FieldValue::Bool(true)), "{}", text);
        }
        for text in ["no", "False", "off", "0"] {
            assert_eq!(FieldKind::Bool.parse(text, 20), Ok(FieldValue::Bool(false)), "{}", text);
        }
        assert!(FieldKind::Bool.parse("maybe", 20).is_err());
    }

    #[test]
    fn float_rejects_non_finite() {
        assert!(FieldKind::Float.parse("inf", 20).is_err());
        assert!(FieldKind::Float.parse("NaN", 20).is_err());
        assert_eq!(FieldKind::Float.parse(" 0.5 ", 20), Ok(FieldValue::Float(0.5)));
    }

    #[test]
    fn input_limit_counts_characters() {
        let err = FieldKind::Text.parse("abcdef", 5).unwrap_err();
        assert_eq!(err, FieldError::TooLong { length: 6, limit: 5 });
        assert!(FieldKind::Text.parse("abcde", 5).is_ok());
    }

    #[test]
    fn display_forms() {
        assert_eq!(FieldValue::Bool(true).to_string(), "yes");
        assert_eq!(FieldValue::Float(0.1).to_string(), "0.1");
        assert_eq!(FieldValue::Int(-4).to_string(), "-4");
    }

    #[test]
    fn json_scalars_convert_by_kind() {
        assert_eq!(FieldKind::Int.from_json(&json!(12), 20), Ok(FieldValue::Int(12)));
        assert_eq!(FieldKind::Int.from_json(&json!("12"), 20), Ok(FieldValue::Int(12)));
        assert_eq!(FieldKind::Bool.from_json(&json!(false), 20), Ok(FieldValue::Bool(false)));
        assert_eq!(
            FieldKind::Text.from_json(&json!(3), 20),
            Ok(FieldValue::Text("3".into()))
        );
        assert!(FieldKind::Int.from_json(&json!(1.5), 20).is_err());
        assert!(FieldKind::Bool.from_json(&json!([1]), 20).is_err());
    }

    #[test]
    fn validators_gate_values() {
        assert_eq!(
            parse_validated(FieldKind::Int, "0", 20, Some(validators::positive)),
            Err(FieldError::Rejected)
        );
        assert!(validators::topic_safe(&FieldValue::Text("kitchen".into())));
        assert!(!validators::topic_safe(&FieldValue::Text("a/b".into())));
        assert!(!validators::pin_number(&FieldValue::Int(40)));
    }
}
