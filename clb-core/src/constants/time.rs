//! Time Constants
//!
//! All durations are in milliseconds unless the name says otherwise.

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Pause between scheduler passes on hosted builds.
pub const LOOP_YIELD_MS: u64 = 5;

/// Age beyond which a cached average is no longer reported.
///
/// Applies to asynchronous queries such as JSON status dumps. Listener
/// dispatch is not gated by it because dispatch happens in the same tick
/// that produced the value.
pub const READING_LIFETIME_MS: u64 = 60_000;

/// Interval between reading dumps while a sensor test session is active.
pub const SENSOR_TEST_INTERVAL_MS: u64 = 1000;
