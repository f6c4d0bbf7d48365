//! Constants for the Connected Little Boxes kernel
//!
//! Centralized numeric and textual constants used by the kernel, the
//! built-in processes and the built-in sensors.
//!
//! ## Organization
//!
//! - **Buffers**: fixed capacities for console lines, listener buffers and
//!   setting input
//! - **Time**: loop yield, reading validity window and test cadence
//!
//! Anything that changes per device lives in the settings subsystem, not here.

/// Buffer sizes and input length limits.
pub mod buffers;

/// Time-related constants for the scheduler loop and cadence evaluation.
pub mod time;

pub use buffers::{
    MAX_MESSAGE_LENGTH, MAX_DESTINATION_LENGTH, CONSOLE_BUFFER_SIZE,
    NUMBER_INPUT_LENGTH, TEXT_INPUT_LENGTH, COMMAND_NAME_LENGTH, MAX_MESSAGE_HANDLERS,
};

pub use time::{
    LOOP_YIELD_MS, READING_LIFETIME_MS, SENSOR_TEST_INTERVAL_MS, MS_PER_SECOND,
};

/// Version of the persisted settings record layout.
///
/// Bump this whenever the meaning of a stored value changes. Records
/// carrying a different version are treated as corrupt and the affected
/// collection is reset to defaults.
pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Name reported for the device until a real identity is configured.
pub const DEFAULT_DEVICE_NAME: &str = "CLB-000000";

/// Processor family reported in registration payloads on host builds.
pub const DEFAULT_PROCESSOR: &str = "host";

/// Topic suffix carrying the registration payload.
pub const REGISTERED_TOPIC: &str = "registered";

/// Topic suffix carrying the connection payload.
pub const CONNECTED_TOPIC: &str = "connected";

/// ASCII escape, used by the console to cancel a sensor test.
pub const ESCAPE_CHAR: u8 = 0x1b;
