//! Time management for the scheduler
//!
//! Provides clock abstraction to handle different time sources:
//! - Monotonic counter (milliseconds since boot, drives averaging and tests)
//! - System clock (wall-clock time once the network has supplied it)
//! - Shared mock clock (tests advance it after the kernel owns it)
//!
//! Calendar cadence needs a broken-down wall-clock reading. [`ClockReading`]
//! provides that breakdown and is only produced from sources that report
//! [`TimeSource::is_wall_clock`].

use alloc::rc::Rc;
use core::cell::Cell;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

/// Timestamp in milliseconds since epoch (or device boot for monotonic)
pub type Timestamp = u64;

/// Source of time for the system
pub trait TimeSource {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;

    /// Get precision in milliseconds
    fn precision_ms(&self) -> u32 {
        1
    }
}

/// Monotonic time source counting from construction
///
/// Never reports wall-clock time, so the clock sensor stays waiting.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicTime {
    /// Start counting from now.
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for MonotonicTime {
    fn now(&self) -> Timestamp {
        self.start.elapsed().as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// System time source (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default)]
pub struct SystemTime;

#[cfg(feature = "std")]
impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Fixed time source
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
    wall_clock: bool,
}

impl FixedTime {
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp, wall_clock: false }
    }

    /// Report this fixed value as wall-clock time.
    pub fn wall_clock(mut self) -> Self {
        self.wall_clock = true;
        self
    }

    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn advance(&mut self, ms: u64) {
        self.timestamp += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }

    fn is_wall_clock(&self) -> bool {
        self.wall_clock
    }
}

/// Mock time source with a shared handle
///
/// Clones share the same underlying counter, so a test can hand one clone to
/// the kernel and keep another to move time forward.
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    now: Rc<Cell<Timestamp>>,
    wall_clock: Rc<Cell<bool>>,
}

impl MockTimeSource {
    /// Monotonic mock starting at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
            wall_clock: Rc::new(Cell::new(false)),
        }
    }

    /// Wall-clock mock starting at `start` milliseconds since the epoch.
    pub fn wall_clock(start: Timestamp) -> Self {
        let source = Self::new(start);
        source.wall_clock.set(true);
        source
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.now.set(timestamp);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Switch between monotonic and wall-clock reporting, as when network
    /// time arrives mid-run.
    pub fn set_wall_clock(&self, wall_clock: bool) {
        self.wall_clock.set(wall_clock);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.now.get()
    }

    fn is_wall_clock(&self) -> bool {
        self.wall_clock.get()
    }
}

/// Calendar breakdown of a wall-clock timestamp (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClockReading {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    /// Monday is 1, Sunday is 7
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl ClockReading {
    /// Break a wall-clock timestamp down into calendar fields.
    ///
    /// Returns `None` for timestamps chrono cannot represent.
    pub fn from_timestamp(timestamp: Timestamp) -> Option<Self> {
        let secs = i64::try_from(timestamp / 1000).ok()?;
        let dt = DateTime::<Utc>::from_timestamp(secs, 0)?;
        Some(Self {
            year: dt.year(),
            month: dt.month() as u8,
            day: dt.day() as u8,
            weekday: dt.weekday().number_from_monday() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        })
    }

    /// Build a reading directly from time-of-day fields.
    pub fn at(hour: u8, minute: u8, second: u8) -> Self {
        Self { year: 1970, month: 1, day: 1, weekday: 4, hour, minute, second }
    }
}

impl core::fmt::Display for ClockReading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}
