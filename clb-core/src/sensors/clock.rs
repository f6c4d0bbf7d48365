//! Wall-clock sensor
//!
//! Publishes a [`ClockReading`] once the time source reports wall-clock
//! time. The registry shares that reading with every sensor for calendar
//! cadence, and the clock's own listeners get the calendar events directly.

use alloc::string::{String, ToString};

use serde_json::{Map, Value};

use crate::cadence::CalendarTracker;
use crate::entity::{Entity, Sensor, SensorContext};
use crate::events::{ChannelFilter, Channels, Event, EventBinder, Trigger};
use crate::listener::ListenerBuffer;
use crate::reading::Reading;
use crate::status::Status;
use crate::time::{ClockReading, Timestamp};

static CLOCK_BINDERS: [EventBinder; 5] = [
    EventBinder::new("sec", Event::Second, Channels::NONE),
    EventBinder::new("min", Event::Minute, Channels::NONE),
    EventBinder::new("5min", Event::FiveMinutes, Channels::NONE),
    EventBinder::new("30min", Event::HalfHour, Channels::NONE),
    EventBinder::new("hour", Event::Hour, Channels::NONE),
];

const WAITING_FOR_TIME: Status = Status::Waiting("time");

#[derive(Debug, Default)]
pub struct ClockSensor {
    reading: Option<Reading>,
    calendar: CalendarTracker,
}

impl ClockSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Entity for ClockSensor {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn status_message(&self, status: Status) -> String {
        match (status, self.reading.as_ref().and_then(Reading::as_clock)) {
            (Status::Ok, Some(clock)) => clock.to_string(),
            (WAITING_FOR_TIME, _) => "clock waiting for time".to_string(),
            (other, _) => other.to_string(),
        }
    }
}

impl Sensor for ClockSensor {
    fn start(&mut self, _now: Timestamp) -> Status {
        self.calendar.reset();
        WAITING_FOR_TIME
    }

    fn update(&mut self, _status: Status, ctx: &mut SensorContext<'_>) -> Status {
        if !ctx.wall_clock() {
            return WAITING_FOR_TIME;
        }
        let Some(clock) = ClockReading::from_timestamp(ctx.now()) else {
            return Status::NotConnected;
        };

        self.reading = Some(Reading::Clock(clock));
        ctx.record_reading();
        for event in self.calendar.evaluate(&clock) {
            ctx.fire(event, ChannelFilter::All);
        }
        Status::Ok
    }

    fn stop(&mut self) {
        self.calendar.reset();
    }

    fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    fn event_binders(&self) -> &'static [EventBinder] {
        &CLOCK_BINDERS
    }

    fn format_reading(&self, trigger: &Trigger, buffer: &mut ListenerBuffer) {
        let Some(clock) = self.reading.as_ref().and_then(Reading::as_clock) else {
            return;
        };
        buffer.value = match trigger.event {
            Event::Second => clock.second,
            Event::Hour => clock.hour,
            _ => clock.minute,
        } as f32;
        buffer.format_message(format_args!("{:02}:{:02}:{:02}", clock.hour, clock.minute, clock.second));
    }

    fn append_json(&self, _now: Timestamp, out: &mut Map<String, Value>) {
        if let Some(clock) = self.reading.as_ref().and_then(Reading::as_clock) {
            out.insert("time".to_string(), Value::String(clock.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    // 2024-01-01 12:05:30 UTC
    const NOON_ISH: Timestamp = 1_704_110_730_000;

    fn update(sensor: &mut ClockSensor, now: Timestamp, wall_clock: bool) -> (Status, Vec<Event>) {
        let mut triggers = Vec::new();
        let status = {
            let mut ctx = SensorContext::new(now, wall_clock, None, &mut triggers);
            sensor.update(Status::Ok, &mut ctx)
        };
        (status, triggers.into_iter().map(|(e, _)| e).collect())
    }

    #[test]
    fn waits_for_wall_clock() {
        let mut sensor = ClockSensor::new();
        assert_eq!(sensor.start(0), WAITING_FOR_TIME);
        assert_eq!(update(&mut sensor, 5000, false).0, WAITING_FOR_TIME);
        assert!(sensor.reading().is_none());
    }

    #[test]
    fn calendar_events_follow_the_clock() {
        let mut sensor = ClockSensor::new();
        sensor.start(0);
        let (status, events) = update(&mut sensor, NOON_ISH, true);
        assert_eq!(status, Status::Ok);
        assert_eq!(events, [Event::Second, Event::Minute, Event::FiveMinutes, Event::Hour]);

        assert!(update(&mut sensor, NOON_ISH + 400, true).1.is_empty());
        assert_eq!(update(&mut sensor, NOON_ISH + 1000, true).1, [Event::Second]);
    }

    #[test]
    fn formats_time_of_day() {
        let mut sensor = ClockSensor::new();
        sensor.start(0);
        update(&mut sensor, NOON_ISH, true);
        let mut buffer = ListenerBuffer::new();
        sensor.format_reading(&Trigger::new(Event::Minute, Channels::NONE), &mut buffer);
        assert_eq!(buffer.message(), "12:05:30");
        assert_eq!(buffer.value, 5.0);
    }
}
