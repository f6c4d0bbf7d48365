//! Hardware abstraction
//!
//! ## Overview
//!
//! The built-in sensors and the console process never touch hardware
//! directly. They are generic over the small traits here, so the same
//! driver code runs against a real bus on a board and against the simulated
//! implementations on a development host or in tests.
//!
//! The simulated types share their state through an `Rc`, so a test can keep
//! one clone and steer the hardware after the sensor has taken ownership of
//! another.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

/// One raw sample from an environmental sensor
///
/// A failed read is reported as NaN in every field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentSample {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity in percent
    pub humidity: f32,
    /// Hectopascals
    pub pressure: f32,
}

impl EnvironmentSample {
    pub const fn new(temperature: f32, humidity: f32, pressure: f32) -> Self {
        Self { temperature, humidity, pressure }
    }

    pub const fn failed() -> Self {
        Self::new(f32::NAN, f32::NAN, f32::NAN)
    }

    pub fn is_valid(&self) -> bool {
        !(self.temperature.is_nan() || self.humidity.is_nan() || self.pressure.is_nan())
    }
}

/// Temperature, humidity and pressure device on an I2C bus
pub trait EnvironmentProbe {
    /// Try to bring up a device at `address`.
    fn probe(&mut self, address: u8) -> bool;

    /// Read the device found by the last successful probe.
    fn read(&mut self) -> EnvironmentSample;
}

/// A digital input pin
pub trait DigitalInput {
    /// Prepare `pin` for input.
    fn configure(&mut self, pin: u8);

    /// Raw electrical level of `pin`.
    fn level(&mut self, pin: u8) -> bool;
}

/// Non-blocking source of console bytes
pub trait LineSource {
    /// Next available byte, if any.
    fn next_byte(&mut self) -> Option<u8>;

    /// Write an echoed byte back to the operator.
    fn echo(&mut self, _byte: u8) {}
}

#[derive(Debug)]
struct EnvironmentState {
    address: Option<u8>,
    sample: EnvironmentSample,
    reads: u32,
}

/// Simulated environmental sensor
#[derive(Debug, Clone)]
pub struct SimulatedEnvironment {
    state: Rc<RefCell<EnvironmentState>>,
}

impl SimulatedEnvironment {
    /// A device answering at `address` with a fixed sample.
    pub fn at(address: u8, sample: EnvironmentSample) -> Self {
        Self {
            state: Rc::new(RefCell::new(EnvironmentState { address: Some(address), sample, reads: 0 })),
        }
    }

    /// No device on the bus.
    pub fn absent() -> Self {
        Self {
            state: Rc::new(RefCell::new(EnvironmentState {
                address: None,
                sample: EnvironmentSample::failed(),
                reads: 0,
            })),
        }
    }

    pub fn set_sample(&self, sample: EnvironmentSample) {
        self.state.borrow_mut().sample = sample;
    }

    /// Make every following read fail.
    pub fn fail_reads(&self) {
        self.state.borrow_mut().sample = EnvironmentSample::failed();
    }

    pub fn reads(&self) -> u32 {
        self.state.borrow().reads
    }
}

impl EnvironmentProbe for SimulatedEnvironment {
    fn probe(&mut self, address: u8) -> bool {
        self.state.borrow().address == Some(address)
    }

    fn read(&mut self) -> EnvironmentSample {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        state.sample
    }
}

/// Simulated input pin shared with the test driving it
#[derive(Debug, Clone, Default)]
pub struct SimulatedPin {
    level: Rc<Cell<bool>>,
    configured: Rc<Cell<Option<u8>>>,
}

impl SimulatedPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&self, level: bool) {
        self.level.set(level);
    }

    /// Pin passed to the last `configure` call.
    pub fn configured_pin(&self) -> Option<u8> {
        self.configured.get()
    }
}

impl DigitalInput for SimulatedPin {
    fn configure(&mut self, pin: u8) {
        self.configured.set(Some(pin));
    }

    fn level(&mut self, _pin: u8) -> bool {
        self.level.get()
    }
}

/// Scripted console input
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    pending: Rc<RefCell<VecDeque<u8>>>,
    echoed: Rc<RefCell<Vec<u8>>>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_text(&self, text: &str) {
        self.pending.borrow_mut().extend(text.bytes());
    }

    pub fn type_byte(&self, byte: u8) {
        self.pending.borrow_mut().push_back(byte);
    }

    pub fn echoed(&self) -> Vec<u8> {
        self.echoed.borrow().clone()
    }
}

impl LineSource for ScriptedInput {
    fn next_byte(&mut self) -> Option<u8> {
        self.pending.borrow_mut().pop_front()
    }

    fn echo(&mut self, byte: u8) {
        self.echoed.borrow_mut().push(byte);
    }
}

/// Standard input read on a background thread
#[cfg(feature = "std")]
pub struct StdinSource {
    bytes: std::sync::mpsc::Receiver<u8>,
}

#[cfg(feature = "std")]
impl StdinSource {
    pub fn spawn() -> Self {
        use std::io::Read;

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            for byte in std::io::stdin().lock().bytes() {
                let Ok(byte) = byte else {
                    break;
                };
                if tx.send(byte).is_err() {
                    break;
                }
            }
        });
        Self { bytes: rx }
    }
}

#[cfg(feature = "std")]
impl LineSource for StdinSource {
    fn next_byte(&mut self) -> Option<u8> {
        self.bytes.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_environment_answers_one_address() {
        let sim = SimulatedEnvironment::at(0x77, EnvironmentSample::new(20.0, 50.0, 1000.0));
        let mut probe = sim.clone();
        assert!(!probe.probe(0x76));
        assert!(probe.probe(0x77));
        assert!(probe.read().is_valid());
        sim.fail_reads();
        assert!(!probe.read().is_valid());
        assert_eq!(sim.reads(), 2);
    }

    #[test]
    fn scripted_input_drains_in_order() {
        let input = ScriptedInput::new();
        let mut source = input.clone();
        input.type_text("ab");
        assert_eq!(source.next_byte(), Some(b'a'));
        assert_eq!(source.next_byte(), Some(b'b'));
        assert_eq!(source.next_byte(), None);
    }
}
