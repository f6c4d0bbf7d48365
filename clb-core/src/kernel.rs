//! Kernel loop and console protocol
//!
//! ## Overview
//!
//! [`Kernel`] owns the [`Registry`] and the collaborators every entity talks
//! to through it: settings storage, the remote publisher, the operator
//! output sink and the time source. It drives startup, runs one cooperative
//! pass per [`Kernel::tick`], and interprets console lines.
//!
//! ## Tick
//!
//! 1. update active processes
//! 2. update active sensors (listener events fire here)
//! 3. route queued deliveries to `Process::receive_message`
//! 4. perform the requests processes raised during the pass
//! 5. poll the sensor test session, if one is running
//!
//! Entities never call back into the kernel; they push [`Request`]s onto the
//! context they are handed and the kernel acts on them once the pass is done.
//!
//! ## Console lines
//!
//! A line starting with `{` is a JSON command envelope. Otherwise the first
//! word is matched against the built-in console commands, and failing that
//! the line is taken as a `key` or `key=value` settings reference.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::commands::{CommandBuffer, InboundCommand};
use crate::console;
use crate::constants::{LOOP_YIELD_MS, SENSOR_TEST_INTERVAL_MS};
use crate::entity::{DeviceInfo, Process, Request, Sensor, TickInfo};
use crate::errors::{CommandError, CommandResult, PublishError, RegistryError, SettingsError, StoreError};
use crate::listener::{DeliveryQueue, ListenerConfig, ListenerTransport, QueueTransport};
use crate::output::{MessageSink, NullSink};
use crate::processes::messages::{format_control_message, MessageHandler, MessageHandlers, Severity};
use crate::publish::{NullPublisher, RemotePublisher};
use crate::registry::{ProcessHandle, Registry, SensorHandle, SettingOwner, SettingsSetup};
use crate::settings::{MemoryStore, SettingReference, SettingsStore};
use crate::status::{BootMode, RestartMode, Status};
use crate::time::{FixedTime, TimeSource, Timestamp};

/// Shown once every entity has started.
const STARTUP_BANNER: &str = "Start complete\n\nType help and press enter for help\n";

/// Host-side boot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KernelConfig {
    pub device: DeviceInfo,
    pub boot_mode: BootMode,
    /// Pause between ticks in [`Kernel::run`]
    pub loop_yield_ms: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            device: DeviceInfo::default(),
            boot_mode: BootMode::Active,
            loop_yield_ms: LOOP_YIELD_MS,
        }
    }
}

/// Builder for [`Kernel`]
///
/// Collaborators left unset default to an in-memory store, a publisher that
/// is never connected, a sink that discards output and a clock stuck at zero.
pub struct KernelBuilder {
    config: KernelConfig,
    store: Option<Box<dyn SettingsStore>>,
    publisher: Option<Box<dyn RemotePublisher>>,
    output: Option<Box<dyn MessageSink>>,
    time: Option<Box<dyn TimeSource>>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self { config, store: None, publisher: None, output: None, time: None }
    }

    pub fn store(mut self, store: impl SettingsStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn publisher(mut self, publisher: impl RemotePublisher + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    pub fn output(mut self, output: impl MessageSink + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn time_source(mut self, time: impl TimeSource + 'static) -> Self {
        self.time = Some(Box::new(time));
        self
    }

    pub fn build(self) -> Kernel {
        Kernel {
            registry: Registry::new(),
            device: self.config.device,
            boot_mode: self.config.boot_mode,
            loop_yield_ms: self.config.loop_yield_ms,
            store: self.store.unwrap_or_else(|| Box::new(MemoryStore::new())),
            publisher: self.publisher.unwrap_or_else(|| Box::new(NullPublisher)),
            output: self.output.unwrap_or_else(|| Box::new(NullSink)),
            time: self.time.unwrap_or_else(|| Box::new(FixedTime::new(0))),
            deliveries: Rc::new(RefCell::new(VecDeque::new())),
            requests: Vec::new(),
            robot_session: false,
            sensor_test: None,
            restart: None,
            settings_setup: None,
            handlers: MessageHandlers::new(),
        }
    }
}

/// Polled sensor test session
#[derive(Debug, Clone, Copy)]
struct SensorTest {
    sensor: SensorHandle,
    last_status: Option<Status>,
    last_report: Option<Timestamp>,
}

/// The orchestration kernel
pub struct Kernel {
    registry: Registry,
    device: DeviceInfo,
    boot_mode: BootMode,
    loop_yield_ms: u64,
    store: Box<dyn SettingsStore>,
    publisher: Box<dyn RemotePublisher>,
    output: Box<dyn MessageSink>,
    time: Box<dyn TimeSource>,
    deliveries: DeliveryQueue,
    requests: Vec<Request>,
    robot_session: bool,
    sensor_test: Option<SensorTest>,
    restart: Option<RestartMode>,
    settings_setup: Option<SettingsSetup>,
    handlers: MessageHandlers,
}

impl Kernel {
    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    // ===== REGISTRATION AND STARTUP =====

    pub fn register_process(&mut self, process: Box<dyn Process>) -> Result<ProcessHandle, RegistryError> {
        self.registry.register_process(process)
    }

    pub fn register_sensor(&mut self, sensor: Box<dyn Sensor>) -> Result<SensorHandle, RegistryError> {
        self.registry.register_sensor(sensor)
    }

    /// Select the boot mode used by the next [`Kernel::setup`].
    pub fn set_boot_mode(&mut self, mode: BootMode) {
        self.boot_mode = mode;
    }

    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    /// Load settings, activate for the boot mode, then init and start.
    ///
    /// Blocks reset to defaults while loading are saved straight back; if
    /// that save fails the outcome is [`SettingsSetup::StorageFailed`].
    pub fn setup(&mut self) -> SettingsSetup {
        let mut setup = self.registry.load_settings(self.store.as_mut());
        if setup == SettingsSetup::ResetToDefaults && self.save_settings().is_err() {
            setup = SettingsSetup::StorageFailed;
        }
        self.settings_setup = Some(setup);
        self.display_message(setup.message());

        let processes = self.registry.activate_processes(self.boot_mode);
        let sensors = self.registry.activate_sensors(self.boot_mode);
        log_info!(
            "boot mode {:?}: {} processes, {} sensors active",
            self.boot_mode,
            processes,
            sensors
        );

        self.registry.init_processes();
        self.registry.init_sensors();

        let tick = self.tick_info();
        self.registry.start_processes(tick, &self.device, &mut self.requests);
        self.registry.start_sensors(tick.now);
        self.drain_requests();
        self.display_message(STARTUP_BANNER);
        setup
    }

    /// Outcome of the settings load performed by [`Kernel::setup`].
    pub fn settings_setup(&self) -> Option<SettingsSetup> {
        self.settings_setup
    }

    /// Stop every active entity and end any test session.
    pub fn shutdown(&mut self) {
        self.sensor_test = None;
        self.registry.stop_processes();
        self.registry.stop_sensors();
    }

    // ===== LOOP =====

    fn tick_info(&self) -> TickInfo {
        TickInfo {
            now: self.time.now(),
            wall_clock: self.time.is_wall_clock(),
            link_connected: self.publisher.is_connected(),
            robot_session: self.robot_session,
        }
    }

    /// Run one cooperative pass.
    pub fn tick(&mut self) {
        let tick = self.tick_info();
        self.registry.update_processes(tick, &self.device, &mut self.requests);
        self.registry.update_sensors(tick);
        self.route_deliveries(tick);
        self.drain_requests();
        self.poll_sensor_test();
    }

    fn route_deliveries(&mut self, tick: TickInfo) {
        loop {
            let next = self.deliveries.borrow_mut().pop_front();
            let Some(delivery) = next else {
                break;
            };
            self.registry.deliver(&delivery, tick, &self.device, &mut self.requests);
        }
    }

    fn drain_requests(&mut self) {
        while !self.requests.is_empty() {
            let pending = core::mem::take(&mut self.requests);
            for request in pending {
                self.perform(request);
            }
        }
    }

    fn perform(&mut self, request: Request) {
        match request {
            Request::ConsoleLine(line) => self.perform_console_line(&line),
            Request::Publish { topic, payload } => {
                // Failures are already logged
                let _ = self.publish(&topic, &payload);
            }
            Request::Display { text, always: true } => self.always_display(&text),
            Request::Display { text, always: false } => self.display_message(&text),
            Request::SaveSettings => {
                let _ = self.save_settings();
            }
            Request::Restart(mode) => self.request_restart(mode),
            Request::CancelSensorTest => self.end_sensor_test(),
            Request::ControlMessage { number, severity, text } => self.control_message(number, severity, &text),
        }
    }

    /// Tick until a restart is requested, pausing between passes.
    #[cfg(feature = "std")]
    pub fn run(&mut self) -> RestartMode {
        loop {
            self.tick();
            if let Some(mode) = self.take_restart_request() {
                return mode;
            }
            std::thread::sleep(std::time::Duration::from_millis(self.loop_yield_ms));
        }
    }

    pub fn loop_yield_ms(&self) -> u64 {
        self.loop_yield_ms
    }

    // ===== CONSOLE PROTOCOL =====

    /// Interpret one console line, replying through the output sink.
    pub fn perform_console_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        // Trailing spaces may belong to a text setting value
        let line = line.trim_start().trim_end_matches(|c: char| c == '\r' || c == '\n');

        if line.starts_with('{') {
            if let Err(err) = self.act_on_json(line) {
                self.reply(&format!("command failed: {}", err));
            }
            return;
        }

        if let Some((command, args)) = console::find(line) {
            (command.run)(self, args);
            return;
        }

        match SettingReference::parse(line) {
            Some(reference) => self.act_on_setting(reference),
            None => self.reply("command not found"),
        }
    }

    fn act_on_setting(&mut self, reference: SettingReference<'_>) {
        let Some(text) = reference.value else {
            match self.registry.display_setting(reference.key) {
                Ok(line) => self.reply(&line),
                Err(_) => self.reply("setting not found"),
            }
            return;
        };

        match self.registry.set_setting(reference.key, text) {
            Ok(owner) => {
                self.reply("setting set OK");
                if self.autosave_enabled() {
                    self.save_owner(owner);
                }
            }
            Err(SettingsError::NotFound) => self.reply("setting not found"),
            Err(_) => self.reply("setting value invalid"),
        }
    }

    fn save_owner(&mut self, owner: SettingOwner) {
        if let Err(err) = self.registry.save_owner_settings(owner, self.store.as_mut()) {
            log_warn!("autosave of {} failed: {}", self.registry.owner_name(owner), err);
            self.reply("settings save failed");
        }
    }

    /// Act on a JSON command envelope.
    ///
    /// An envelope whose `to` names another device is forwarded through the
    /// remote publisher; anything else runs here.
    pub fn act_on_json(&mut self, text: &str) -> CommandResult<()> {
        let inbound = InboundCommand::parse(text)?;
        let destination = match inbound.to.as_deref() {
            Some(to) if !to.eq_ignore_ascii_case(&self.device.name) => to.to_string(),
            _ => String::new(),
        };
        self.run_command(&inbound.process, &inbound.command, &inbound.fields, &destination)
    }

    /// Run `process.command` with JSON `fields`, locally or on `destination`.
    pub fn run_command(&mut self, process: &str, command: &str, fields: &Value, destination: &str) -> CommandResult<()> {
        let command = self.registry.find_command(process, command)?;
        let buffer = CommandBuffer::from_json(command, fields)?;
        self.invoke(process, buffer, destination)
    }

    /// Invoke a command buffer.
    ///
    /// With a non-empty `destination` the buffer is wrapped in an envelope
    /// and handed to the remote publisher; the action never runs here.
    pub fn invoke(&mut self, process: &str, mut buffer: CommandBuffer, destination: &str) -> CommandResult<()> {
        if !destination.is_empty() {
            let envelope = buffer.envelope(process, destination).to_string();
            self.publisher.publish_command(destination, &envelope).map_err(|err| {
                log_warn!("redirect of {} to {} failed: {}", buffer.command().name, destination, err);
                CommandError::from(err)
            })?;
            return Ok(());
        }

        buffer.populate_defaults()?;
        let action = buffer.command().action;
        action(self, &buffer)
    }

    // ===== OUTPUT =====

    /// Output is suppressed while messages are off or a robot session is connected.
    pub fn messages_suppressed(&self) -> bool {
        let active = self
            .registry
            .setting_value("messagesactive")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        !active || self.robot_session
    }

    fn autosave_enabled(&self) -> bool {
        self.registry
            .setting_value("autosavesettings")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Show a general message unless suppressed.
    pub fn display_message(&mut self, text: &str) {
        if !self.messages_suppressed() {
            self.always_display(text);
        }
    }

    /// Show a message regardless of suppression.
    pub fn always_display(&mut self, text: &str) {
        self.output.write_str(text);
        self.output.write_str("\n");
    }

    /// Reply to the operator.
    pub fn reply(&mut self, text: &str) {
        self.always_display(text);
    }

    // ===== CONTROL MESSAGES =====

    /// Bind a control message handler; fails once every slot is taken.
    pub fn bind_message_handler(&mut self, handler: impl MessageHandler + 'static) -> Result<(), RegistryError> {
        self.handlers.bind(Box::new(handler))
    }

    /// Show a control message on the console and pass it to every bound handler.
    pub fn control_message(&mut self, number: i32, severity: Severity, text: &str) {
        self.display_message(&format_control_message(number, severity, text));
        self.handlers.dispatch(number, severity, text);
    }

    // ===== COLLABORATORS =====

    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.publisher.publish(topic, payload).map_err(|err| {
            log_warn!("publish to {} failed: {}", topic, err);
            err
        })
    }

    pub fn link_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    pub fn save_settings(&mut self) -> Result<usize, StoreError> {
        self.registry.save_settings(self.store.as_mut()).map_err(|err| {
            log_warn!("settings save failed: {}", err);
            err
        })
    }

    /// Names of the records currently held by the store.
    pub fn stored_records(&self) -> Result<Vec<String>, StoreError> {
        self.store.names()
    }

    /// Wipe storage, restore defaults and request a cold restart.
    pub fn factory_reset(&mut self) {
        if let Err(err) = self.store.wipe() {
            log_warn!("settings wipe failed: {}", err);
        }
        self.registry.reset_all_settings();
        let _ = self.save_settings();
        self.request_restart(RestartMode::Cold);
    }

    pub fn request_restart(&mut self, mode: RestartMode) {
        log_info!("restart requested: {:?}", mode);
        self.restart = Some(mode);
    }

    /// Pending restart, cleared by this call.
    pub fn take_restart_request(&mut self) -> Option<RestartMode> {
        self.restart.take()
    }

    pub fn set_robot_session(&mut self, connected: bool) {
        self.robot_session = connected;
    }

    pub fn robot_session(&self) -> bool {
        self.robot_session
    }

    pub fn now(&self) -> Timestamp {
        self.time.now()
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut DeviceInfo {
        &mut self.device
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    // ===== LISTENERS =====

    /// Attach a listener to `sensor` that delivers to `process`.
    ///
    /// `trigger` names one of the sensor's event binders.
    pub fn add_listener(
        &mut self,
        sensor: &str,
        trigger: &str,
        process: &str,
        destination: &str,
        message: Option<&str>,
    ) -> Result<(), RegistryError> {
        let sensor_handle = self
            .registry
            .find_sensor(sensor)
            .ok_or_else(|| RegistryError::UnknownSensor(sensor.to_string()))?;
        let process_handle = self
            .registry
            .find_process(process)
            .ok_or_else(|| RegistryError::UnknownProcess(process.to_string()))?;
        let binder = self.registry.binder(sensor_handle, trigger)?;

        let mut config = ListenerConfig::new(destination, binder.trigger);
        if let Some(message) = message {
            config = config.with_message(message);
        }
        let process_name = self
            .registry
            .process(process_handle)
            .map(|p| p.name())
            .unwrap_or_default();
        let transport = QueueTransport::new(process_name, self.deliveries.clone());
        self.registry.add_listener(sensor_handle, config, Box::new(transport))
    }

    /// Attach a listener with a caller-supplied transport.
    pub fn add_listener_transport(
        &mut self,
        sensor: &str,
        config: ListenerConfig,
        transport: Box<dyn ListenerTransport>,
    ) -> Result<(), RegistryError> {
        let handle = self
            .registry
            .find_sensor(sensor)
            .ok_or_else(|| RegistryError::UnknownSensor(sensor.to_string()))?;
        self.registry.add_listener(handle, config, transport)
    }

    // ===== SENSOR TEST =====

    /// Begin a test session on `sensor`, replacing any running one.
    pub fn start_sensor_test(&mut self, sensor: &str) -> bool {
        match self.registry.find_sensor(sensor) {
            Some(handle) => {
                self.sensor_test = Some(SensorTest { sensor: handle, last_status: None, last_report: None });
                true
            }
            None => false,
        }
    }

    pub fn end_sensor_test(&mut self) {
        if self.sensor_test.take().is_some() {
            self.reply("sensor test ended");
        }
    }

    pub fn sensor_test_active(&self) -> bool {
        self.sensor_test.is_some()
    }

    fn poll_sensor_test(&mut self) {
        let Some(mut test) = self.sensor_test else {
            return;
        };
        let now = self.time.now();
        let (Some(sensor), Some(status)) = (
            self.registry.sensor(test.sensor),
            self.registry.sensor_status(test.sensor),
        ) else {
            self.sensor_test = None;
            return;
        };

        let mut lines = Vec::new();
        if test.last_status != Some(status) {
            lines.push(format!("{}: {}", sensor.name(), sensor.status_message(status)));
            test.last_status = Some(status);
        }

        let due = test
            .last_report
            .map_or(true, |at| now.saturating_sub(at) >= SENSOR_TEST_INTERVAL_MS);
        if status.is_ok() && due {
            let mut reading = Map::new();
            sensor.append_json(now, &mut reading);
            lines.push(Value::Object(reading).to_string());
            test.last_report = Some(now);
        }

        self.sensor_test = Some(test);
        for line in lines {
            self.reply(&line);
        }
    }
}
