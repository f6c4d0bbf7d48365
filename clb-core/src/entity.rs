//! Process and sensor capability interfaces
//!
//! ## Overview
//!
//! Everything the scheduler drives is either a [`Process`] (console,
//! networking, messages) or a [`Sensor`] (clock, environment, motion). Both
//! share the [`Entity`] basics: a unique name, an optional settings block and
//! a human-readable status message. The registry holds them as trait objects
//! and owns their [`Status`]; implementations only return the next status
//! from their lifecycle callbacks.
//!
//! ## Contexts
//!
//! Lifecycle callbacks receive a context rather than a handle to the kernel:
//!
//! - [`ProcessContext`] exposes the tick time, device identity, a
//!   [`StatusBoard`] snapshot of every entity, and an outbox of [`Request`]s
//!   the kernel acts on once the pass is over
//! - [`SensorContext`] exposes the tick time and the shared clock reading,
//!   and collects the events the sensor wants fired
//!
//! Keeping side effects in the outbox means no callback ever holds a mutable
//! borrow of another entity.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::commands::CommandCollection;
use crate::constants::{DEFAULT_DEVICE_NAME, DEFAULT_PROCESSOR};
use crate::events::{ChannelFilter, Event, EventBinder, Trigger};
use crate::listener::ListenerBuffer;
use crate::processes::messages::Severity;
use crate::reading::Reading;
use crate::settings::SettingsBlock;
use crate::status::{BootModes, RestartMode, Status};
use crate::time::{ClockReading, Timestamp};

/// Identity reported to the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub processor: String,
    pub version: String,
    pub mac_address: [u8; 6],
    /// Reason given by the platform for the last reset
    pub reset_reason: String,
    pub reset_code: i32,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            processor: DEFAULT_PROCESSOR.to_string(),
            version: crate::VERSION.to_string(),
            mac_address: [0; 6],
            reset_reason: String::from("power on"),
            reset_code: 0,
        }
    }
}

impl DeviceInfo {
    /// MAC address as `xx:xx:xx:xx:xx:xx`.
    pub fn mac_string(&self) -> String {
        let mut text = String::with_capacity(17);
        for (i, byte) in self.mac_address.iter().enumerate() {
            if i > 0 {
                text.push(':');
            }
            let _ = core::fmt::Write::write_fmt(&mut text, format_args!("{:02x}", byte));
        }
        text
    }
}

/// Per-tick facts shared by every callback in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickInfo {
    pub now: Timestamp,
    /// The time source reports wall-clock time
    pub wall_clock: bool,
    /// The remote publisher link is up
    pub link_connected: bool,
    /// A robot session currently owns the console
    pub robot_session: bool,
}

/// Side effect requested by a process, performed by the kernel after the pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Run a line through the console protocol
    ConsoleLine(String),
    /// Publish through the remote publisher
    Publish { topic: String, payload: String },
    /// Show text to the operator; `always` bypasses message suppression
    Display { text: String, always: bool },
    /// Persist every settings block
    SaveSettings,
    /// Ask the host to restart
    Restart(RestartMode),
    /// End the active sensor test session
    CancelSensorTest,
    /// Raise a numbered control message
    ControlMessage { number: i32, severity: Severity, text: String },
}

/// Process or sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Process,
    Sensor,
}

/// One row of the status board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub name: &'static str,
    pub kind: EntityKind,
    pub status: Status,
    pub has_commands: bool,
}

/// Snapshot of every registered entity's status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBoard {
    entries: Vec<StatusEntry>,
}

impl StatusBoard {
    pub fn new(entries: Vec<StatusEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// Replace every entry, keeping the allocation.
    pub fn refill(&mut self, entries: impl IntoIterator<Item = StatusEntry>) {
        self.entries.clear();
        self.entries.extend(entries);
    }

    fn find(&self, kind: EntityKind, name: &str) -> Option<&StatusEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.name.eq_ignore_ascii_case(name))
    }

    pub fn process_status(&self, name: &str) -> Option<Status> {
        self.find(EntityKind::Process, name).map(|e| e.status)
    }

    pub fn sensor_status(&self, name: &str) -> Option<Status> {
        self.find(EntityKind::Sensor, name).map(|e| e.status)
    }

    /// Record a status change made during the current pass.
    pub fn update(&mut self, kind: EntityKind, name: &str, status: Status) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.kind == kind && e.name.eq_ignore_ascii_case(name))
        {
            entry.status = status;
        }
    }

    /// Names of OK processes that accept commands.
    pub fn ok_processes_with_commands(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntityKind::Process && e.status.is_ok() && e.has_commands)
            .map(|e| e.name)
            .collect()
    }

    /// Names of OK sensors.
    pub fn ok_sensors(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntityKind::Sensor && e.status.is_ok())
            .map(|e| e.name)
            .collect()
    }
}

/// Context passed to process callbacks
pub struct ProcessContext<'a> {
    tick: TickInfo,
    device: &'a DeviceInfo,
    board: &'a StatusBoard,
    requests: &'a mut Vec<Request>,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        tick: TickInfo,
        device: &'a DeviceInfo,
        board: &'a StatusBoard,
        requests: &'a mut Vec<Request>,
    ) -> Self {
        Self { tick, device, board, requests }
    }

    pub fn now(&self) -> Timestamp {
        self.tick.now
    }

    pub fn tick(&self) -> TickInfo {
        self.tick
    }

    pub fn device(&self) -> &DeviceInfo {
        self.device
    }

    pub fn board(&self) -> &StatusBoard {
        self.board
    }

    pub fn link_connected(&self) -> bool {
        self.tick.link_connected
    }

    pub fn robot_session(&self) -> bool {
        self.tick.robot_session
    }

    pub fn request(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub fn publish(&mut self, topic: &str, payload: &str) {
        self.request(Request::Publish { topic: topic.to_string(), payload: payload.to_string() });
    }

    /// Show text unless messages are suppressed.
    pub fn display(&mut self, text: &str) {
        self.request(Request::Display { text: text.to_string(), always: false });
    }

    /// Show text regardless of message suppression.
    pub fn always_display(&mut self, text: &str) {
        self.request(Request::Display { text: text.to_string(), always: true });
    }

    pub fn control_message(&mut self, number: i32, severity: Severity, text: &str) {
        self.request(Request::ControlMessage { number, severity, text: text.to_string() });
    }
}

/// Context passed to sensor updates
pub struct SensorContext<'a> {
    now: Timestamp,
    wall_clock: bool,
    clock: Option<ClockReading>,
    triggers: &'a mut Vec<(Event, ChannelFilter)>,
    reading_taken: bool,
}

impl<'a> SensorContext<'a> {
    pub fn new(
        now: Timestamp,
        wall_clock: bool,
        clock: Option<ClockReading>,
        triggers: &'a mut Vec<(Event, ChannelFilter)>,
    ) -> Self {
        Self { now, wall_clock, clock, triggers, reading_taken: false }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn wall_clock(&self) -> bool {
        self.wall_clock
    }

    /// Shared clock reading, present while the clock sensor is OK.
    pub fn clock(&self) -> Option<ClockReading> {
        self.clock
    }

    /// Queue `event` for dispatch once the update returns.
    pub fn fire(&mut self, event: Event, filter: ChannelFilter) {
        self.triggers.push((event, filter));
    }

    /// Note that this update produced a new reading.
    pub fn record_reading(&mut self) {
        self.reading_taken = true;
    }

    pub fn reading_taken(&self) -> bool {
        self.reading_taken
    }
}

/// Common identity of processes and sensors
pub trait Entity {
    /// Unique name, used for lookup, storage and listener routing.
    fn name(&self) -> &'static str;

    fn settings(&self) -> Option<&dyn SettingsBlock> {
        None
    }

    fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
        None
    }

    /// Human-readable description of `status`.
    fn status_message(&self, status: Status) -> String {
        status.to_string()
    }
}

/// A non-sensor subsystem driven by the scheduler
pub trait Process: Entity {
    /// Boot modes this process is active in.
    fn boot_modes(&self) -> BootModes {
        BootModes::all()
    }

    fn commands(&self) -> Option<&'static CommandCollection> {
        None
    }

    fn init(&mut self) {}

    fn start(&mut self, ctx: &mut ProcessContext<'_>) -> Status;

    fn update(&mut self, status: Status, _ctx: &mut ProcessContext<'_>) -> Status {
        status
    }

    /// Must tolerate being called without a successful start.
    fn stop(&mut self) {}

    /// Listener delivery addressed to this process.
    fn receive_message(
        &mut self,
        _destination: &str,
        _buffer: &ListenerBuffer,
        _ctx: &mut ProcessContext<'_>,
    ) {
    }
}

/// A lifecycle entity that produces readings and fans them out to listeners
pub trait Sensor: Entity {
    fn boot_modes(&self) -> BootModes {
        BootModes::all()
    }

    fn version(&self) -> &'static str {
        "1.0"
    }

    fn init(&mut self) {}

    /// Probe hardware and allocate the active reading.
    fn start(&mut self, now: Timestamp) -> Status;

    /// Begin the first measurement after a successful start.
    fn start_reading(&mut self) {}

    fn update(&mut self, status: Status, ctx: &mut SensorContext<'_>) -> Status;

    /// Must tolerate being called without a successful start.
    fn stop(&mut self) {}

    /// Active reading; must be present whenever the status is OK.
    fn reading(&self) -> Option<&Reading>;

    /// Triggers this sensor supports.
    fn event_binders(&self) -> &'static [EventBinder] {
        &[]
    }

    /// Write the active reading into a listener buffer for `trigger`.
    fn format_reading(&self, _trigger: &Trigger, _buffer: &mut ListenerBuffer) {}

    /// Add the current reading to a JSON status object.
    fn append_json(&self, _now: Timestamp, _out: &mut Map<String, Value>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn board() -> StatusBoard {
        StatusBoard::new(vec![
            StatusEntry { name: "console", kind: EntityKind::Process, status: Status::Ok, has_commands: true },
            StatusEntry { name: "messages", kind: EntityKind::Process, status: Status::Ok, has_commands: false },
            StatusEntry { name: "mqtt", kind: EntityKind::Process, status: Status::Waiting("MQTT"), has_commands: true },
            StatusEntry { name: "clock", kind: EntityKind::Sensor, status: Status::Ok, has_commands: false },
            StatusEntry { name: "pir", kind: EntityKind::Sensor, status: Status::NotFitted, has_commands: false },
        ])
    }

    #[test]
    fn board_lists_ok_entities() {
        let board = board();
        assert_eq!(board.ok_processes_with_commands(), ["console"]);
        assert_eq!(board.ok_sensors(), ["clock"]);
        assert_eq!(board.process_status("MQTT"), Some(Status::Waiting("MQTT")));
        assert_eq!(board.sensor_status("console"), None);
    }

    #[test]
    fn board_update_tracks_pass_changes() {
        let mut board = board();
        board.update(EntityKind::Process, "mqtt", Status::Ok);
        assert_eq!(board.ok_processes_with_commands(), ["console", "mqtt"]);
    }

    #[test]
    fn mac_formatting() {
        let device = DeviceInfo { mac_address: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01], ..Default::default() };
        assert_eq!(device.mac_string(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn context_collects_requests() {
        let device = DeviceInfo::default();
        let board = board();
        let mut requests = Vec::new();
        let mut ctx = ProcessContext::new(TickInfo::default(), &device, &board, &mut requests);
        ctx.publish("lb/data", "1");
        ctx.display("hello");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], Request::Display { text: "hello".into(), always: false });
    }
}
