//! Temperature, humidity and pressure sensor
//!
//! ## Overview
//!
//! Drives a BME280-style device through [`EnvironmentProbe`]. Each update
//! takes one sample, folds it into a rolling average and then decides which
//! events to raise:
//!
//! - `Change` per channel, when the reportable value (the latest average, or
//!   the raw value before the first average completes) has moved by more
//!   than the channel's delta since it was last sent. The first update after
//!   start always fires all three.
//! - the calendar events, against the shared clock reading
//!
//! ## Channels
//!
//! | Channel       | Text     | Packed value                 |
//! |---------------|----------|------------------------------|
//! | `TEMPERATURE` | `%.1f`   | normalised temperature       |
//! | `HUMIDITY`    | `%.0f`   | normalised humidity          |
//! | `PRESSURE`    | `%.0f`   | normalised pressure          |
//! | `COMBINED`    | JSON     | normalised temperature       |
//!
//! A listener configured for more than one channel gets the combined form.

use alloc::string::{String, ToString};

use serde_json::{Map, Value};

use crate::cadence::{normalise, CalendarTracker, ChangeDetector, RollingAverage};
use crate::constants::READING_LIFETIME_MS;
use crate::entity::{Entity, Sensor, SensorContext};
use crate::events::{ChannelFilter, Channels, Event, EventBinder, Trigger};
use crate::field::validators;
use crate::hal::EnvironmentProbe;
use crate::listener::ListenerBuffer;
use crate::reading::{EnvironmentReading, Reading};
use crate::settings::SettingsBlock;
use crate::status::Status;
use crate::time::Timestamp;

/// I2C addresses tried in order at start
pub const PROBE_ADDRESSES: [u8; 2] = [0x76, 0x77];

pub const TEMPERATURE: Channels = Channels::bit(0);
pub const HUMIDITY: Channels = Channels::bit(1);
pub const PRESSURE: Channels = Channels::bit(2);
pub const COMBINED: Channels = Channels::bit(3);

crate::settings_block! {
    /// Settings for [`EnvironmentSensor`]
    pub struct EnvironmentSettings => "bme280Sensor", "BME280 sensor hardware" {
        fitted: bool = false => "bme280sensorfitted", "BME 280 sensor fitted (yes or no)";
        averages: i32 = 25 => "bme280envnoOfAverages", "Environment number of averages",
            validate = validators::positive;
        temp_delta: f32 = 0.5 => "bme280tempchangetoxmit", "Temperature change to transmit",
            validate = validators::non_negative;
        temp_base: f32 = 10.0 => "bme280tempbasenorm", "Temperature base for normalisation";
        temp_limit: f32 = 30.0 => "bme280templimitnorm", "Temperature limit for normalisation";
        press_delta: f32 = 10.0 => "bme280presschangetoxmit", "Pressure change to transmit",
            validate = validators::non_negative;
        press_base: f32 = 0.0 => "bme280pressbasenorm", "Pressure base for normalisation";
        press_limit: f32 = 100.0 => "bme280presslimitnorm", "Pressure limit for normalisation";
        humid_delta: f32 = 2.0 => "bme280humidchangetoxmit", "Humidity change to transmit",
            validate = validators::non_negative;
        humid_base: f32 = 0.0 => "bme280humidbasenorm", "Humidity base for normalisation";
        humid_limit: f32 = 100.0 => "bme280humidlimitnorm", "Humidity limit for normalisation";
    }
}

macro_rules! channel_binders {
    ($($name:literal => $channels:expr, $event:expr;)*) => {
        [$(EventBinder::new($name, $event, $channels)),*]
    };
}

static ENVIRONMENT_BINDERS: [EventBinder; 23] = channel_binders! {
    "humidsec" => HUMIDITY, Event::Second;
    "humidmin" => HUMIDITY, Event::Minute;
    "humid5min" => HUMIDITY, Event::FiveMinutes;
    "humid30min" => HUMIDITY, Event::HalfHour;
    "humidhour" => HUMIDITY, Event::Hour;
    "humidchanged" => HUMIDITY, Event::Change;
    "presssec" => PRESSURE, Event::Second;
    "pressmin" => PRESSURE, Event::Minute;
    "press5min" => PRESSURE, Event::FiveMinutes;
    "press30min" => PRESSURE, Event::HalfHour;
    "presshour" => PRESSURE, Event::Hour;
    "presschanged" => PRESSURE, Event::Change;
    "tempsec" => TEMPERATURE, Event::Second;
    "tempmin" => TEMPERATURE, Event::Minute;
    "temp5min" => TEMPERATURE, Event::FiveMinutes;
    "temp30min" => TEMPERATURE, Event::HalfHour;
    "temphour" => TEMPERATURE, Event::Hour;
    "tempchanged" => TEMPERATURE, Event::Change;
    "allsec" => COMBINED, Event::Second;
    "allmin" => COMBINED, Event::Minute;
    "all5min" => COMBINED, Event::FiveMinutes;
    "all30min" => COMBINED, Event::HalfHour;
    "allhour" => COMBINED, Event::Hour;
};

/// Order of the per-channel change detectors
const CHANGE_CHANNELS: [Channels; 3] = [HUMIDITY, TEMPERATURE, PRESSURE];

fn round2(value: f32) -> Value {
    Value::from(libm::round(f64::from(value) * 100.0) / 100.0)
}

pub struct EnvironmentSensor<P> {
    probe: P,
    settings: EnvironmentSettings,
    reading: Option<Reading>,
    average: RollingAverage<3>,
    changes: [ChangeDetector; 3],
    calendar: CalendarTracker,
    first_run: bool,
}

impl<P: EnvironmentProbe> EnvironmentSensor<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            settings: EnvironmentSettings::default(),
            reading: None,
            average: RollingAverage::new(),
            changes: [ChangeDetector::new(); 3],
            calendar: CalendarTracker::new(),
            first_run: true,
        }
    }

    pub fn with_settings(mut self, settings: EnvironmentSettings) -> Self {
        self.settings = settings;
        self
    }

    fn environment(&self) -> Option<&EnvironmentReading> {
        self.reading.as_ref().and_then(Reading::as_environment)
    }

    /// (value, delta) per change channel, in `CHANGE_CHANNELS` order.
    fn change_inputs(&self, reading: &EnvironmentReading) -> [(f32, f32); 3] {
        let (temperature, humidity, pressure) = reading.reportable();
        [
            (humidity, self.settings.humid_delta),
            (temperature, self.settings.temp_delta),
            (pressure, self.settings.press_delta),
        ]
    }
}

impl<P> Entity for EnvironmentSensor<P> {
    fn name(&self) -> &'static str {
        "bme280"
    }

    fn settings(&self) -> Option<&dyn SettingsBlock> {
        Some(&self.settings)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
        Some(&mut self.settings)
    }

    fn status_message(&self, status: Status) -> String {
        match status {
            Status::Ok => match self.reading.as_ref().and_then(Reading::as_environment) {
                Some(r) => alloc::format!(
                    "Temp:{:.2} Humidity:{:.2} pressure:{:.2}",
                    r.temperature_average,
                    r.humidity_average,
                    r.pressure_average
                ),
                None => status.to_string(),
            },
            Status::NotConnected => "BME280 not connected".to_string(),
            Status::NotFitted => "BME280 not fitted".to_string(),
            other => other.to_string(),
        }
    }
}

impl<P: EnvironmentProbe> Sensor for EnvironmentSensor<P> {
    fn start(&mut self, _now: Timestamp) -> Status {
        self.first_run = true;
        self.changes = [ChangeDetector::new(); 3];
        self.calendar.reset();
        self.average.clear();
        self.reading = None;

        if !self.settings.fitted {
            return Status::NotFitted;
        }

        for address in PROBE_ADDRESSES {
            if !self.probe.probe(address) {
                continue;
            }
            if !self.probe.read().is_valid() {
                continue;
            }
            let reading = EnvironmentReading { address, ..EnvironmentReading::default() };
            self.reading = Some(Reading::Environment(reading));
            return Status::Ok;
        }
        Status::NotConnected
    }

    fn start_reading(&mut self) {
        self.average.clear();
    }

    fn update(&mut self, _status: Status, ctx: &mut SensorContext<'_>) -> Status {
        let sample = self.probe.read();
        if !sample.is_valid() {
            return Status::NotConnected;
        }

        let now = ctx.now();
        let samples = u32::try_from(self.settings.averages).unwrap_or(1);
        let averages = self
            .average
            .push([sample.temperature, sample.humidity, sample.pressure], samples, now);
        let completions = self.average.completions();

        let mut reading = self.environment().copied().unwrap_or_default();
        reading.temperature = sample.temperature;
        reading.humidity = sample.humidity;
        reading.pressure = sample.pressure;
        if let Some([temperature, humidity, pressure]) = averages {
            reading.temperature_average = temperature;
            reading.humidity_average = humidity;
            reading.pressure_average = pressure;
            reading.average_completed_at = Some(now);
            reading.averages_completed = completions;
        }
        self.reading = Some(Reading::Environment(reading));
        ctx.record_reading();

        let inputs = self.change_inputs(&reading);
        for ((detector, channels), (value, delta)) in self.changes.iter_mut().zip(CHANGE_CHANNELS).zip(inputs) {
            if detector.check(value, delta, self.first_run) {
                ctx.fire(Event::Change, ChannelFilter::Exact(channels));
            }
        }
        self.first_run = false;

        if let Some(clock) = ctx.clock() {
            for event in self.calendar.evaluate(&clock) {
                ctx.fire(event, ChannelFilter::All);
            }
        }
        Status::Ok
    }

    fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    fn event_binders(&self) -> &'static [EventBinder] {
        &ENVIRONMENT_BINDERS
    }

    fn format_reading(&self, trigger: &Trigger, buffer: &mut ListenerBuffer) {
        let Some(reading) = self.environment() else {
            return;
        };
        let (temperature, humidity, pressure) = reading.reportable();
        let s = &self.settings;
        let channels = trigger.channels;

        if channels.contains(COMBINED) || channels.count() > 1 {
            buffer.value = normalise(temperature, s.temp_base, s.temp_limit);
            buffer.format_message(format_args!(
                "{{\"humid\":{:.0},\"temp\":{:.1},\"press\":{:.0}}}",
                humidity, temperature, pressure
            ));
        } else if channels.contains(HUMIDITY) {
            buffer.value = normalise(humidity, s.humid_base, s.humid_limit);
            buffer.format_message(format_args!("{:.0}", humidity));
        } else if channels.contains(TEMPERATURE) {
            buffer.value = normalise(temperature, s.temp_base, s.temp_limit);
            buffer.format_message(format_args!("{:.1}", temperature));
        } else if channels.contains(PRESSURE) {
            buffer.value = normalise(pressure, s.press_base, s.press_limit);
            buffer.format_message(format_args!("{:.0}", pressure));
        }
    }

    fn append_json(&self, now: Timestamp, out: &mut Map<String, Value>) {
        let Some(reading) = self.environment() else {
            return;
        };
        if !reading.average_is_fresh(now, READING_LIFETIME_MS) {
            return;
        }
        out.insert("temp".to_string(), round2(reading.temperature_average));
        out.insert("humidity".to_string(), round2(reading.humidity_average));
        out.insert("pressure".to_string(), round2(reading.pressure_average));
    }
}
