//! PIR motion sensor
//!
//! Polls a digital input each update. A level change fires `Change` with
//! value 1/0 and the text `triggered`/`clear`, plus `Triggered` or
//! `Cleared`, which deliver the listener's preset message unchanged.

use alloc::string::{String, ToString};

use serde_json::{Map, Value};

use crate::entity::{Entity, Sensor, SensorContext};
use crate::events::{ChannelFilter, Channels, Event, EventBinder, Trigger};
use crate::field::validators;
use crate::hal::DigitalInput;
use crate::listener::ListenerBuffer;
use crate::reading::{MotionReading, Reading};
use crate::settings::SettingsBlock;
use crate::status::Status;
use crate::time::Timestamp;

crate::settings_block! {
    /// Settings for [`MotionSensor`]
    pub struct MotionSettings => "pirSensor", "PIR sensor hardware" {
        fitted: bool = false => "pirsensorfitted", "PIR sensor fitted (yes or no)";
        pin: i32 = 4 => "pirsensorinputpin", "PIR sensor input pin", validate = validators::pin_number;
        active_high: bool = true => "piractivehigh", "PIR sensor active high (yes or no)";
    }
}

static MOTION_BINDERS: [EventBinder; 3] = [
    EventBinder::new("changed", Event::Change, Channels::NONE),
    EventBinder::new("triggered", Event::Triggered, Channels::NONE),
    EventBinder::new("cleared", Event::Cleared, Channels::NONE),
];

pub struct MotionSensor<I> {
    input: I,
    settings: MotionSettings,
    reading: Option<Reading>,
}

impl<I: DigitalInput> MotionSensor<I> {
    pub fn new(input: I) -> Self {
        Self { input, settings: MotionSettings::default(), reading: None }
    }

    pub fn with_settings(mut self, settings: MotionSettings) -> Self {
        self.settings = settings;
        self
    }

    fn motion(&self) -> Option<&MotionReading> {
        self.reading.as_ref().and_then(Reading::as_motion)
    }

    fn pin(&self) -> u8 {
        u8::try_from(self.settings.pin).unwrap_or_default()
    }

    fn triggered(&mut self) -> bool {
        let pin = self.pin();
        self.input.level(pin) == self.settings.active_high
    }
}

impl<I> Entity for MotionSensor<I> {
    fn name(&self) -> &'static str {
        "pir"
    }

    fn settings(&self) -> Option<&dyn SettingsBlock> {
        Some(&self.settings)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
        Some(&mut self.settings)
    }

    fn status_message(&self, status: Status) -> String {
        let triggered = self.reading.as_ref().and_then(Reading::as_motion).map(|m| m.triggered);
        match (status, triggered) {
            (Status::Ok, Some(true)) => "PIR detecting".to_string(),
            (Status::Ok, _) => "PIR nothing".to_string(),
            (Status::Off, _) => "PIR sensor off".to_string(),
            (Status::NotFitted, _) => "PIR sensor not fitted".to_string(),
            (other, _) => other.to_string(),
        }
    }
}

impl<I: DigitalInput> Sensor for MotionSensor<I> {
    fn start(&mut self, now: Timestamp) -> Status {
        if !self.settings.fitted {
            return Status::NotFitted;
        }
        let pin = self.pin();
        self.input.configure(pin);
        let triggered = self.triggered();
        self.reading = Some(Reading::Motion(MotionReading { triggered, changed_at: Some(now) }));
        Status::Ok
    }

    fn update(&mut self, _status: Status, ctx: &mut SensorContext<'_>) -> Status {
        let previous = self.motion().copied().unwrap_or_default();
        let triggered = self.triggered();
        ctx.record_reading();
        if triggered == previous.triggered {
            return Status::Ok;
        }

        self.reading = Some(Reading::Motion(MotionReading { triggered, changed_at: Some(ctx.now()) }));
        ctx.fire(Event::Change, ChannelFilter::All);
        ctx.fire(if triggered { Event::Triggered } else { Event::Cleared }, ChannelFilter::All);
        Status::Ok
    }

    fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    fn event_binders(&self) -> &'static [EventBinder] {
        &MOTION_BINDERS
    }

    fn format_reading(&self, trigger: &Trigger, buffer: &mut ListenerBuffer) {
        let Some(motion) = self.motion() else {
            return;
        };
        buffer.value = if motion.triggered { 1.0 } else { 0.0 };
        if trigger.event == Event::Change {
            buffer.set_message(if motion.triggered { "triggered" } else { "clear" });
        }
    }

    fn append_json(&self, _now: Timestamp, out: &mut Map<String, Value>) {
        if let Some(motion) = self.motion() {
            let flag = if motion.triggered { "1" } else { "0" };
            out.insert("pir".to_string(), Value::String(flag.to_string()));
        }
    }
}
