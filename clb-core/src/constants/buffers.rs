//! Buffer Sizes and Input Limits
//!
//! Capacities chosen for microcontrollers with a few hundred kilobytes of
//! RAM. Listener buffers are allocated once per listener and reused for the
//! whole run, so they are sized for the longest formatted reading rather than
//! the average one.

// ===== LISTENER BUFFERS =====

/// Capacity of the text half of a listener output buffer.
///
/// Large enough for the combined environment reading
/// `{"humid":100,"temp":-40.0,"press":1100}` with room to spare.
pub const MAX_MESSAGE_LENGTH: usize = 120;

/// Capacity of a listener destination identifier (process name plus topic).
pub const MAX_DESTINATION_LENGTH: usize = 64;

// ===== CONTROL MESSAGES =====

/// Control message handlers that can be bound at once.
pub const MAX_MESSAGE_HANDLERS: usize = 4;

// ===== CONSOLE =====

/// Longest console line accepted; further characters are dropped.
pub const CONSOLE_BUFFER_SIZE: usize = 240;

/// Longest command name matched by the console command table.
pub const COMMAND_NAME_LENGTH: usize = 30;

// ===== SETTING AND COMMAND INPUT =====

/// Maximum text accepted for a numeric or boolean field.
pub const NUMBER_INPUT_LENGTH: usize = 20;

/// Default maximum text accepted for a text field.
pub const TEXT_INPUT_LENGTH: usize = 100;
