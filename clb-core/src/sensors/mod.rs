//! Built-in sensors

pub mod clock;
pub mod environment;
pub mod motion;

pub use clock::ClockSensor;
pub use environment::{EnvironmentSensor, EnvironmentSettings};
pub use motion::{MotionSensor, MotionSettings};
