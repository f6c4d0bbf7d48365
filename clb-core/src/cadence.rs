//! Cadence and trigger evaluation
//!
//! Three small state machines shared by sensor drivers:
//!
//! - [`RollingAverage`]: accumulates N-channel samples and produces an
//!   average every `samples` readings, then starts over
//! - [`ChangeDetector`]: remembers the last value sent for one channel and
//!   reports when a new value has moved by more than a delta
//! - [`CalendarTracker`]: turns a stream of clock readings into
//!   second/minute/5-minute/30-minute/hour boundary events
//!
//! ## Calendar evaluation
//!
//! The tracker short-circuits from fine to coarse. If the second has not
//! changed nothing fires; if the minute has not changed only the second
//! event fires; and so on up to the hour. Each boundary therefore fires at
//! most once, and coarse boundaries cost nothing on ticks where the finer
//! one repeats.

use heapless::Vec as BoundedVec;

use crate::events::Event;
use crate::time::{ClockReading, Timestamp};

/// Rolling average over `N` channels
#[derive(Debug, Clone, PartialEq)]
pub struct RollingAverage<const N: usize> {
    totals: [f32; N],
    count: u32,
    averages: [f32; N],
    completed_at: Option<Timestamp>,
    completions: u32,
}

impl<const N: usize> Default for RollingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RollingAverage<N> {
    pub const fn new() -> Self {
        Self {
            totals: [0.0; N],
            count: 0,
            averages: [0.0; N],
            completed_at: None,
            completions: 0,
        }
    }

    /// Add one sample per channel.
    ///
    /// When `samples` values have been accumulated the averages are computed,
    /// the completion time recorded and the accumulator cleared; the call then
    /// returns the new averages. A `samples` of zero is treated as one.
    pub fn push(&mut self, values: [f32; N], samples: u32, now: Timestamp) -> Option<[f32; N]> {
        for (total, value) in self.totals.iter_mut().zip(values) {
            *total += value;
        }
        self.count += 1;

        if self.count < samples.max(1) {
            return None;
        }

        for (average, total) in self.averages.iter_mut().zip(self.totals) {
            *average = total / self.count as f32;
        }
        self.totals = [0.0; N];
        self.count = 0;
        self.completed_at = Some(now);
        self.completions += 1;
        Some(self.averages)
    }

    /// Samples currently accumulated toward the next average.
    pub fn pending(&self) -> u32 {
        self.count
    }

    /// Running totals toward the next average.
    pub fn accumulator(&self) -> [f32; N] {
        self.totals
    }

    pub fn averages(&self) -> Option<[f32; N]> {
        (self.completions > 0).then_some(self.averages)
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    pub fn completions(&self) -> u32 {
        self.completions
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Delta trigger for one channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChangeDetector {
    last_sent: Option<f32>,
}

impl ChangeDetector {
    pub const fn new() -> Self {
        Self { last_sent: None }
    }

    /// Decide whether `value` should be reported.
    ///
    /// Fires when `force` is set, when nothing has been sent yet, or when
    /// the absolute difference from the last sent value exceeds `delta`.
    /// Firing records `value` as the new last-sent value.
    pub fn check(&mut self, value: f32, delta: f32, force: bool) -> bool {
        let fire = force
            || match self.last_sent {
                Some(last) => libm::fabsf(last - value) > delta,
                None => true,
            };
        if fire {
            self.last_sent = Some(value);
        }
        fire
    }

    pub fn last_sent(&self) -> Option<f32> {
        self.last_sent
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Calendar boundary events raised by one clock reading
pub type CalendarEvents = BoundedVec<Event, 5>;

/// Second/minute/hour boundary tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarTracker {
    last_second: Option<u8>,
    last_minute: Option<u8>,
    last_hour: Option<u8>,
}

impl CalendarTracker {
    pub const fn new() -> Self {
        Self { last_second: None, last_minute: None, last_hour: None }
    }

    /// Boundary events for `clock`, finest first.
    ///
    /// The first evaluation after construction or [`reset`](Self::reset)
    /// fires second, minute and hour (plus the 5/30-minute events when the
    /// minute is aligned).
    pub fn evaluate(&mut self, clock: &ClockReading) -> CalendarEvents {
        let mut events = CalendarEvents::new();

        if self.last_second == Some(clock.second) {
            return events;
        }
        self.last_second = Some(clock.second);
        let _ = events.push(Event::Second);

        if self.last_minute == Some(clock.minute) {
            return events;
        }
        self.last_minute = Some(clock.minute);
        let _ = events.push(Event::Minute);
        if clock.minute % 5 == 0 {
            let _ = events.push(Event::FiveMinutes);
        }
        if clock.minute % 30 == 0 {
            let _ = events.push(Event::HalfHour);
        }

        if self.last_hour == Some(clock.hour) {
            return events;
        }
        self.last_hour = Some(clock.hour);
        let _ = events.push(Event::Hour);

        events
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Map `value` from `[min, max]` onto `[0, 1]`, clamped.
///
/// A degenerate range maps everything to zero.
pub fn normalise(value: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if span <= 0.0 || !span.is_finite() {
        return 0.0;
    }
    ((value - min) / span).clamp(0.0, 1.0)
}
