//! Error Types for the Orchestration Kernel
//!
//! ## Design Philosophy
//!
//! Errors describe *boundary* failures: a lookup that found nothing, a value a
//! validator refused, a message that lacked required structure, or a storage
//! backend that could not be reached. Hardware trouble is deliberately absent
//! from this module. A sensor whose probe fails degrades to a non-erroring
//! [`Status`](crate::status::Status) and the scheduler keeps running.
//!
//! Each subsystem has its own small enum so callers can match exhaustively:
//!
//! - [`FieldError`]: text could not be turned into a typed field value
//! - [`SettingsError`]: setting lookup, validation and registration failures
//! - [`StoreError`]: persistence backend failures
//! - [`CommandError`]: command lookup, buffer population and remote routing
//! - [`RegistryError`]: entity, trigger and listener lookups
//! - [`PublishError`]: the remote-publish collaborator refused a message
//!
//! ## Error Handling Strategy
//!
//! The console layer is the recovery boundary. Everything below it returns
//! `Result` and propagates with `?`; the console reports the error text and
//! the loop carries on.
//!
//! ```rust
//! use clb_core::errors::SettingsError;
//!
//! fn report(result: Result<(), SettingsError>) -> &'static str {
//!     match result {
//!         Ok(()) => "setting set OK",
//!         Err(SettingsError::NotFound) => "setting not found",
//!         Err(SettingsError::Invalid { .. }) => "setting value invalid",
//!         Err(_) => "setting error",
//!     }
//! }
//! ```

use alloc::string::String;

use thiserror_no_std::Error;

/// Result type for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Result type for command operations
pub type CommandResult<T> = Result<T, CommandError>;

/// Failure to convert text into a field value
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// Input longer than the field accepts
    #[error("Input too long: {length} characters, limit {limit}")]
    TooLong {
        /// Characters supplied
        length: usize,
        /// Characters permitted
        limit: usize,
    },

    /// Text does not parse as the field's type
    #[error("Not a valid {expected}")]
    Unparseable {
        /// Human name of the expected type
        expected: &'static str,
    },

    /// Value parsed but the field's validator refused it
    #[error("Value rejected by validator")]
    Rejected,
}

/// Settings lookup and update errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// No registered collection holds this key
    #[error("setting not found")]
    NotFound,

    /// The value was refused; the stored value is unchanged
    #[error("setting value invalid: {reason}")]
    Invalid {
        /// Why the value was refused
        reason: FieldError,
    },

    /// Two registered collections declare the same key
    #[error("duplicate setting key {key}")]
    Duplicate {
        /// The clashing key
        key: &'static str,
    },

    /// Import payload was not the expected JSON shape
    #[error("malformed settings JSON")]
    Malformed,
}

impl From<FieldError> for SettingsError {
    fn from(reason: FieldError) -> Self {
        SettingsError::Invalid { reason }
    }
}

/// Persistence backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend cannot be reached at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored record exists but cannot be decoded
    #[error("stored settings for {0} are corrupt")]
    Corrupt(String),

    /// A read or write failed part way
    #[error("storage I/O failed: {0}")]
    Io(String),
}

/// Command lookup, population and routing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No registered process has this name
    #[error("process {0} not found")]
    UnknownProcess(String),

    /// The process has no command collection
    #[error("process {0} has no commands")]
    NoCommands(String),

    /// The process has no command with this name
    #[error("command {0} not found")]
    UnknownCommand(String),

    /// The command has no field with this name
    #[error("command field {0} not found")]
    UnknownField(String),

    /// A field value was refused
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Why the value was refused
        reason: FieldError,
    },

    /// A field has no value and no default
    #[error("missing value for {0}")]
    MissingField(&'static str),

    /// Inbound JSON lacked the expected structure
    #[error("malformed command message: {0}")]
    MalformedMessage(&'static str),

    /// The remote-publish collaborator refused the envelope
    #[error("remote publish failed: {0}")]
    Publish(PublishError),

    /// The action ran and reported a failure
    #[error("command failed: {0}")]
    Failed(String),
}

impl From<PublishError> for CommandError {
    fn from(err: PublishError) -> Self {
        CommandError::Publish(err)
    }
}

/// Registry lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An entity with this name is already registered
    #[error("{0} is already registered")]
    DuplicateName(String),

    /// A settings key clashes with one already registered
    #[error("duplicate setting key {0}")]
    DuplicateSetting(&'static str),

    /// No registered sensor has this name
    #[error("sensor {0} not found")]
    UnknownSensor(String),

    /// No registered process has this name
    #[error("process {0} not found")]
    UnknownProcess(String),

    /// The sensor does not bind a trigger with this name
    #[error("trigger {0} not found")]
    UnknownTrigger(String),

    /// Every control message handler slot is taken
    #[error("message handler table full ({0} slots)")]
    HandlersFull(usize),
}

/// Remote publish errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// No transport link is up
    #[error("not connected")]
    NotConnected,

    /// The transport refused the message
    #[error("rejected: {0}")]
    Rejected(String),
}
