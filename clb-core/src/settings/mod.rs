//! Typed, validated, persisted configuration
//!
//! ## Overview
//!
//! Every process and sensor that needs configuration owns a *settings block*:
//! a plain struct whose fields are the current values. The block is described
//! by a static [`SettingCollection`], which lists one [`SettingItem`] per field
//! with its persistence key, prompt, kind, input limit and validator.
//!
//! Blocks are declared with [`settings_block!`](crate::settings_block), which
//! generates the struct, its `Default` (the default-initializer for every
//! field), the item table and the [`SettingsBlock`] implementation. Field
//! access is by name through generated match arms; there is no offset
//! arithmetic and no raw byte layout.
//!
//! ```rust
//! use clb_core::settings::SettingsBlock;
//! use clb_core::field::validators;
//!
//! clb_core::settings_block! {
//!     /// Settings for a demo fan
//!     pub struct FanSettings => "fan", "Fan controller" {
//!         enabled: bool = false => "fanfitted", "Fan fitted (yes or no)";
//!         speed: i32 = 3 => "fanspeed", "Fan speed", validate = validators::positive;
//!     }
//! }
//!
//! let mut settings = FanSettings::default();
//! assert!(settings.set_from_text("fanspeed", "5").is_ok());
//! assert!(settings.set_from_text("fanspeed", "0").is_err());
//! assert_eq!(settings.speed, 5);
//! ```
//!
//! ## Text forms
//!
//! - `display_all` prints `prompt [key]: value` lines for people
//! - `dump_all` prints `key=value` lines that can be fed back through the
//!   console to restore the same configuration
//!
//! ## Persistence
//!
//! See [`store`] for the versioned record format and the storage backends.

pub mod store;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Write;

use serde_json::{json, Value};

use crate::errors::{FieldError, SettingsError, SettingsResult};
use crate::field::{self, FieldKind, FieldValue, Validator};

pub use store::{LoadOutcome, MemoryStore, SettingsRecord, SettingsStore};
#[cfg(feature = "std")]
pub use store::FileStore;

/// One configurable field of a settings block
#[derive(Debug, Clone, Copy)]
pub struct SettingItem {
    /// Persistence and console key
    pub key: &'static str,
    /// Human prompt shown in listings
    pub prompt: &'static str,
    pub kind: FieldKind,
    /// Longest input text accepted
    pub max_len: usize,
    pub validator: Option<Validator>,
}

/// Static description of a settings block
#[derive(Debug, Clone, Copy)]
pub struct SettingCollection {
    /// Collection name, normally the owning entity's name
    pub name: &'static str,
    pub description: &'static str,
    pub items: &'static [SettingItem],
}

impl SettingCollection {
    /// Case-insensitive key lookup.
    pub fn find(&self, key: &str) -> Option<&'static SettingItem> {
        self.items.iter().find(|item| item.key.eq_ignore_ascii_case(key))
    }
}

/// A typed settings block
///
/// The four required methods are generated by
/// [`settings_block!`](crate::settings_block); the rest are shared behavior
/// written against them.
pub trait SettingsBlock {
    /// Item table for this block.
    fn collection(&self) -> &'static SettingCollection;

    /// Current value of the field with exactly this key.
    fn value(&self, key: &str) -> Option<FieldValue>;

    /// Store `value` in the field with exactly this key.
    ///
    /// Returns false for an unknown key or a kind mismatch; nothing changes in
    /// either case.
    fn assign(&mut self, key: &str, value: &FieldValue) -> bool;

    /// Run the default-initializer for one field.
    fn reset(&mut self, key: &str) -> bool;

    /// Item for `key`, matched case-insensitively.
    fn item(&self, key: &str) -> Option<&'static SettingItem> {
        self.collection().find(key)
    }

    /// Current value of `key` formatted for display.
    fn display(&self, key: &str) -> Option<String> {
        let item = self.item(key)?;
        self.value(item.key).map(|value| value.to_string())
    }

    /// Parse, validate and store a value given as text.
    ///
    /// The field is only written once the text has parsed and passed the
    /// validator, so a rejected value leaves the previous value in place.
    fn set_from_text(&mut self, key: &str, text: &str) -> SettingsResult<()> {
        let item = self.item(key).ok_or(SettingsError::NotFound)?;
        let value = field::parse_validated(item.kind, text, item.max_len, item.validator)?;
        if self.assign(item.key, &value) {
            Ok(())
        } else {
            Err(FieldError::Unparseable { expected: item.kind.name() }.into())
        }
    }

    /// Reset every field to its default.
    fn reset_all(&mut self) {
        for item in self.collection().items {
            self.reset(item.key);
        }
    }

    /// Append `prompt [key]: value` lines for items matching `filter`.
    fn display_all(&self, filter: Option<&str>, out: &mut String) -> usize {
        let mut shown = 0;
        for item in matching(self.collection(), filter) {
            if let Some(value) = self.value(item.key) {
                let _ = writeln!(out, "    {} [{}]: {}", item.prompt, item.key, value);
                shown += 1;
            }
        }
        shown
    }

    /// Append restorable `key=value` lines for items matching `filter`.
    fn dump_all(&self, filter: Option<&str>, out: &mut String) -> usize {
        let mut shown = 0;
        for item in matching(self.collection(), filter) {
            if let Some(value) = self.value(item.key) {
                let _ = writeln!(out, "{}={}", item.key, value);
                shown += 1;
            }
        }
        shown
    }

    /// Schema plus current values as JSON.
    fn to_json(&self, owner: &str) -> Value {
        let collection = self.collection();
        let settings: Vec<Value> = collection
            .items
            .iter()
            .map(|item| {
                json!({
                    "key": item.key,
                    "prompt": item.prompt,
                    "type": item.kind.name(),
                    "value": self.value(item.key).map(|v| v.to_json()).unwrap_or(Value::Null),
                })
            })
            .collect();

        json!({
            "name": owner,
            "desc": collection.description,
            "settings": settings,
        })
    }

    /// Every value in its display form, keyed by item key.
    fn values_text(&self) -> BTreeMap<String, String> {
        self.collection()
            .items
            .iter()
            .filter_map(|item| self.value(item.key).map(|v| (item.key.to_string(), v.to_string())))
            .collect()
    }
}

fn matching<'a>(
    collection: &'static SettingCollection,
    filter: Option<&'a str>,
) -> impl Iterator<Item = &'static SettingItem> + 'a {
    collection.items.iter().filter(move |item| match filter {
        None => true,
        Some(f) => contains_ignore_case(item.key, f) || contains_ignore_case(collection.name, f),
    })
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

/// A console settings reference: `key` or `key=value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingReference<'a> {
    pub key: &'a str,
    pub value: Option<&'a str>,
}

impl<'a> SettingReference<'a> {
    /// Split a console line into key and optional value.
    ///
    /// The value is kept verbatim so text settings keep their spaces; only
    /// the one space after `=` in the `key = value` form is dropped. Returns
    /// `None` for blank lines and lines whose key contains whitespace, which
    /// cannot be setting references.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim_start().trim_end_matches(|c: char| c == '\r' || c == '\n');
        let (key, value) = match line.split_once('=') {
            Some((raw_key, value)) => {
                let key = raw_key.trim_end();
                let value = if key.len() < raw_key.len() {
                    value.strip_prefix(' ').unwrap_or(value)
                } else {
                    value
                };
                (key, Some(value))
            }
            None => (line.trim_end(), None),
        };
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }
        Some(Self { key, value })
    }
}

/// Declare a settings block
///
/// Generates the struct, its `Default`, a `COLLECTION` item table and the
/// [`SettingsBlock`](crate::settings::SettingsBlock) implementation. Each
/// field line reads `name: type = default => "key", "prompt"` followed by an
/// optional `max = N` input limit and an optional `validate = path`.
#[macro_export]
macro_rules! settings_block {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident => $collection:literal, $description:literal {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty = $default:expr
                    => $key:literal, $prompt:literal
                    $(, max = $max:expr)?
                    $(, validate = $validator:path)? ;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl ::core::default::Default for $name {
            fn default() -> Self {
                Self {
                    $( $field: $default, )*
                }
            }
        }

        impl $name {
            /// Item table for this block.
            pub const COLLECTION: $crate::settings::SettingCollection =
                $crate::settings::SettingCollection {
                    name: $collection,
                    description: $description,
                    items: &[
                        $(
                            $crate::settings::SettingItem {
                                key: $key,
                                prompt: $prompt,
                                kind: <$ty as $crate::field::FieldType>::KIND,
                                max_len: $crate::__setting_max!(
                                    <$ty as $crate::field::FieldType>::MAX_INPUT $(, $max)?
                                ),
                                validator: $crate::__setting_validator!($($validator)?),
                            },
                        )*
                    ],
                };
        }

        impl $crate::settings::SettingsBlock for $name {
            fn collection(&self) -> &'static $crate::settings::SettingCollection {
                static COLLECTION: $crate::settings::SettingCollection = $name::COLLECTION;
                &COLLECTION
            }

            #[allow(unused_variables)]
            fn value(&self, key: &str) -> ::core::option::Option<$crate::field::FieldValue> {
                match key {
                    $( $key => ::core::option::Option::Some(
                        $crate::field::FieldType::to_value(&self.$field)
                    ), )*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn assign(&mut self, key: &str, value: &$crate::field::FieldValue) -> bool {
                match key {
                    $( $key => match <$ty as $crate::field::FieldType>::from_value(value) {
                        ::core::option::Option::Some(v) => {
                            self.$field = v;
                            true
                        }
                        ::core::option::Option::None => false,
                    }, )*
                    _ => false,
                }
            }

            fn reset(&mut self, key: &str) -> bool {
                match key {
                    $( $key => {
                        self.$field = $default;
                        true
                    } )*
                    _ => false,
                }
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __setting_max {
    ($default:expr, $max:expr) => {
        $max
    };
    ($default:expr) => {
        $default
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __setting_validator {
    () => {
        ::core::option::Option::None
    };
    ($validator:path) => {
        ::core::option::Option::Some($validator as $crate::field::Validator)
    };
}
