//! Shared rig for kernel integration tests
//!
//! Builds a kernel with the built-in processes and sensors wired to
//! simulated hardware, a memory sink, a recording publisher and a mock clock.
//! Every simulated part is a shared handle, so a test keeps its own clone to
//! drive inputs and inspect outputs while the kernel owns the other.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use clb_core::hal::{EnvironmentSample, ScriptedInput, SimulatedEnvironment, SimulatedPin};
use clb_core::listener::{ListenerBuffer, ListenerTransport};
use clb_core::output::MemorySink;
use clb_core::errors::StoreError;
use clb_core::processes::{ConsoleProcess, ConsoleSettings, MessagesProcess, MessagesSettings};
use clb_core::publish::MemoryPublisher;
use clb_core::sensors::{ClockSensor, EnvironmentSensor, EnvironmentSettings, MotionSensor, MotionSettings};
use clb_core::settings::store::save_block;
use clb_core::settings::{MemoryStore, SettingsStore};
use clb_core::time::MockTimeSource;
use clb_core::{Kernel, KernelConfig, Timestamp};

/// 2024-01-01 12:00:00 UTC
pub const NOON: Timestamp = 1_704_110_400_000;

/// Indoor conditions the simulated environment sensor starts with.
pub const ROOM: EnvironmentSample = EnvironmentSample::new(20.0, 50.0, 1000.0);

pub struct Rig {
    pub kernel: Kernel,
    pub sink: MemorySink,
    pub publisher: MemoryPublisher,
    pub time: MockTimeSource,
    pub environment: SimulatedEnvironment,
    pub pin: SimulatedPin,
    pub input: ScriptedInput,
    /// Everything printed by `setup`
    pub startup: String,
}

impl Rig {
    /// Boot against `store`, keeping the startup output aside.
    pub fn boot(store: impl SettingsStore + 'static) -> Self {
        let sink = MemorySink::new();
        let publisher = MemoryPublisher::connected();
        let time = MockTimeSource::wall_clock(NOON);
        let environment = SimulatedEnvironment::at(0x76, ROOM);
        let pin = SimulatedPin::new();
        let input = ScriptedInput::new();

        let mut kernel = Kernel::builder(KernelConfig::default())
            .store(store)
            .output(sink.clone())
            .publisher(publisher.clone())
            .time_source(time.clone())
            .build();
        kernel.register_process(Box::new(MessagesProcess::new())).unwrap();
        kernel.register_process(Box::new(ConsoleProcess::new(input.clone()))).unwrap();
        kernel.register_sensor(Box::new(ClockSensor::new())).unwrap();
        kernel.register_sensor(Box::new(EnvironmentSensor::new(environment.clone()))).unwrap();
        kernel.register_sensor(Box::new(MotionSensor::new(pin.clone()))).unwrap();
        kernel.setup();
        let startup = sink.take();

        Self { kernel, sink, publisher, time, environment, pin, input, startup }
    }

    /// Boot with both hardware sensors fitted.
    pub fn fitted() -> Self {
        Self::boot(fitted_store())
    }

    /// Advance the clock by `ms` and run one pass.
    pub fn step(&mut self, ms: u64) {
        self.time.advance(ms);
        self.kernel.tick();
    }

    /// Run a console line and return what it printed.
    pub fn console(&mut self, line: &str) -> String {
        self.kernel.perform_console_line(line);
        self.sink.take()
    }
}

/// Store holding records that mark both hardware sensors fitted.
pub fn fitted_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    let environment = EnvironmentSettings { fitted: true, averages: 1, ..Default::default() };
    let motion = MotionSettings { fitted: true, ..Default::default() };
    save_block(&mut store, "bme280", &environment).unwrap();
    save_block(&mut store, "pir", &motion).unwrap();
    store
}

/// [`fitted_store`] plus default records for every other settings block.
pub fn complete_store() -> MemoryStore {
    let mut store = fitted_store();
    save_block(&mut store, "messages", &MessagesSettings::default()).unwrap();
    save_block(&mut store, "console", &ConsoleSettings::default()).unwrap();
    store
}

/// Store with a broken backend
///
/// Saves always fail. Loads fail too unless `reads` is set, in which case
/// every record reads as missing.
#[derive(Debug, Clone, Copy)]
pub struct FailingStore {
    pub reads: bool,
}

impl SettingsStore for FailingStore {
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.reads {
            Ok(None)
        } else {
            Err(StoreError::Unavailable(name.to_string()))
        }
    }

    fn save(&mut self, name: &str, _bytes: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Io(name.to_string()))
    }

    fn wipe(&mut self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(String::from("wipe")))
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

/// One listener delivery as seen by [`Recorder`]
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub destination: String,
    pub value: f32,
    pub message: String,
}

/// Listener transport that keeps every delivery
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    received: Rc<RefCell<Vec<Received>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Received> {
        std::mem::take(&mut *self.received.borrow_mut())
    }
}

impl ListenerTransport for Recorder {
    fn receive_message(&mut self, destination: &str, buffer: &ListenerBuffer) {
        self.received.borrow_mut().push(Received {
            destination: destination.to_string(),
            value: buffer.value,
            message: buffer.message().to_string(),
        });
    }

    fn describe(&self) -> String {
        String::from("recorder")
    }
}
