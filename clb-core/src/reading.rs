//! Active readings
//!
//! Each sensor owns exactly one active reading, overwritten on every update.
//! Readings are a closed set of variants so that listeners, JSON dumps and
//! the shared clock can inspect them without knowing which driver produced
//! them.

use serde::Serialize;

use crate::time::{ClockReading, Timestamp};

/// Current value record of a sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reading {
    Environment(EnvironmentReading),
    Motion(MotionReading),
    Clock(ClockReading),
}

impl Reading {
    pub fn as_clock(&self) -> Option<&ClockReading> {
        match self {
            Reading::Clock(clock) => Some(clock),
            _ => None,
        }
    }

    pub fn as_environment(&self) -> Option<&EnvironmentReading> {
        match self {
            Reading::Environment(env) => Some(env),
            _ => None,
        }
    }

    pub fn as_motion(&self) -> Option<&MotionReading> {
        match self {
            Reading::Motion(motion) => Some(motion),
            _ => None,
        }
    }
}

/// Temperature, humidity and pressure with their rolling averages
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReading {
    /// Latest raw temperature, degrees C
    pub temperature: f32,
    /// Latest raw relative humidity, percent
    pub humidity: f32,
    /// Latest raw pressure, hPa
    pub pressure: f32,
    pub temperature_average: f32,
    pub humidity_average: f32,
    pub pressure_average: f32,
    /// When the most recent average completed
    pub average_completed_at: Option<Timestamp>,
    /// Number of averages completed since start
    pub averages_completed: u32,
    /// Bus address the device answered on
    pub address: u8,
}

impl EnvironmentReading {
    /// Average if one has completed, otherwise the raw value.
    pub fn reportable(&self) -> (f32, f32, f32) {
        if self.averages_completed > 0 {
            (self.temperature_average, self.humidity_average, self.pressure_average)
        } else {
            (self.temperature, self.humidity, self.pressure)
        }
    }

    /// True while the last average is younger than `lifetime_ms`.
    pub fn average_is_fresh(&self, now: Timestamp, lifetime_ms: u64) -> bool {
        match self.average_completed_at {
            Some(at) => now.saturating_sub(at) < lifetime_ms,
            None => false,
        }
    }
}

/// Binary motion input state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MotionReading {
    pub triggered: bool,
    /// When the input last changed state
    pub changed_at: Option<Timestamp>,
}
