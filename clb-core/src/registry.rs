//! Registry and lifecycle engine
//!
//! ## Overview
//!
//! The registry owns every process and sensor in registration order, plus an
//! *active* index list per kind that is rebuilt whenever the boot mode
//! changes. Handles ([`ProcessHandle`], [`SensorHandle`]) are plain indices
//! into the owning vectors; entities are never removed during a run, so a
//! handle stays valid for the life of the registry.
//!
//! ## Lifecycle
//!
//! The `*_processes` / `*_sensors` passes walk the active list in
//! registration order and call a callback only when the entity's status
//! permits it:
//!
//! | Pass   | Runs when status is      | Status afterwards              |
//! |--------|--------------------------|--------------------------------|
//! | init   | always                   | unchanged                      |
//! | start  | `Unstarted` or `Off`     | whatever `start` returned      |
//! | update | `Ok` or `Waiting(..)`    | whatever `update` returned     |
//! | stop   | always                   | `Off`                          |
//!
//! A sensor that reports `Ok` without an active reading is demoted to
//! `NotConnected`; listeners format from the active reading and must never
//! see it missing.
//!
//! ## Sensor dispatch
//!
//! Events queued by a sensor during its update are dispatched to its
//! listeners as soon as the update returns, in the order they were queued,
//! and only while the sensor is `Ok`.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde_json::{json, Map, Value};

use crate::commands::{Command, CommandCollection};
use crate::entity::{
    DeviceInfo, EntityKind, Process, ProcessContext, Request, Sensor, SensorContext, StatusBoard,
    StatusEntry, TickInfo,
};
use crate::errors::{CommandError, RegistryError, SettingsError, SettingsResult, StoreError};
use crate::events::{find_binder, ChannelFilter, Event, EventBinder};
use crate::field::FieldValue;
use crate::listener::{Delivery, Listener, ListenerConfig, ListenerList, ListenerTransport};
use crate::reading::Reading;
use crate::settings::store::{load_block, save_block};
use crate::settings::{SettingItem, SettingsBlock, SettingsStore};
use crate::status::{BootMode, Status};
use crate::time::{ClockReading, Timestamp};

/// Stable reference to a registered process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(usize);

/// Stable reference to a registered sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorHandle(usize);

impl ProcessHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl SensorHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

struct ProcessEntry {
    process: Box<dyn Process>,
    status: Status,
}

impl ProcessEntry {
    fn board_entry(&self) -> StatusEntry {
        StatusEntry {
            name: self.process.name(),
            kind: EntityKind::Process,
            status: self.status,
            has_commands: self.process.commands().is_some(),
        }
    }
}

struct SensorEntry {
    sensor: Box<dyn Sensor>,
    status: Status,
    listeners: ListenerList,
    last_reading_at: Option<Timestamp>,
    readings: u32,
    last_transmitted: u32,
}

impl SensorEntry {
    fn board_entry(&self) -> StatusEntry {
        StatusEntry { name: self.sensor.name(), kind: EntityKind::Sensor, status: self.status, has_commands: false }
    }
}

/// Reading counters kept for each sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadingCounters {
    /// Readings taken since registration
    pub readings: u32,
    /// Reading number most recently delivered to a listener
    pub last_transmitted: u32,
    pub last_reading_at: Option<Timestamp>,
}

/// Owner of a settings block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingOwner {
    Process(ProcessHandle),
    Sensor(SensorHandle),
}

/// Result of a settings startup load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSetup {
    /// Every block came from storage
    Loaded,
    /// At least one block was missing or corrupt and has been reset
    ResetToDefaults,
    /// The backend failed; every block is at defaults
    StorageFailed,
}

impl SettingsSetup {
    /// Startup line reported to the operator.
    pub const fn message(self) -> &'static str {
        match self {
            SettingsSetup::Loaded => "Settings loaded OK",
            SettingsSetup::ResetToDefaults => "Settings reset to defaults",
            SettingsSetup::StorageFailed => "Settings file system fail",
        }
    }
}

/// Outcome of a bulk settings import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    /// Keys that were unknown or whose values were refused
    pub rejected: Vec<String>,
}

/// Owner of every process and sensor
#[derive(Default)]
pub struct Registry {
    processes: Vec<ProcessEntry>,
    active_processes: Vec<usize>,
    sensors: Vec<SensorEntry>,
    active_sensors: Vec<usize>,
    clock: Option<ClockReading>,
    /// Board handed to process callbacks, refilled in place each pass
    board: StatusBoard,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== REGISTRATION =====

    fn check_unique(&self, name: &str, settings: Option<&dyn SettingsBlock>) -> Result<(), RegistryError> {
        let taken = self.processes.iter().any(|e| e.process.name().eq_ignore_ascii_case(name))
            || self.sensors.iter().any(|e| e.sensor.name().eq_ignore_ascii_case(name));
        if taken {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        if let Some(block) = settings {
            for item in block.collection().items {
                if self.find_setting(item.key).is_some() {
                    return Err(RegistryError::DuplicateSetting(item.key));
                }
            }
        }
        Ok(())
    }

    /// Append a process to the all-processes list.
    pub fn register_process(&mut self, process: Box<dyn Process>) -> Result<ProcessHandle, RegistryError> {
        self.check_unique(process.name(), process.settings())?;
        self.processes.push(ProcessEntry { process, status: Status::Unstarted });
        Ok(ProcessHandle(self.processes.len() - 1))
    }

    /// Append a sensor to the all-sensors list.
    pub fn register_sensor(&mut self, sensor: Box<dyn Sensor>) -> Result<SensorHandle, RegistryError> {
        self.check_unique(sensor.name(), sensor.settings())?;
        self.sensors.push(SensorEntry {
            sensor,
            status: Status::Unstarted,
            listeners: ListenerList::new(),
            last_reading_at: None,
            readings: 0,
            last_transmitted: 0,
        });
        Ok(SensorHandle(self.sensors.len() - 1))
    }

    // ===== ACTIVATION =====

    /// Rebuild the active process list for `mode`.
    pub fn activate_processes(&mut self, mode: BootMode) -> usize {
        self.active_processes.clear();
        for handle in 0..self.processes.len() {
            self.activate_process(ProcessHandle(handle), mode);
        }
        self.active_processes.len()
    }

    /// Append one process to the active list if it takes part in `mode`.
    pub fn activate_process(&mut self, handle: ProcessHandle, mode: BootMode) -> bool {
        let Some(entry) = self.processes.get(handle.0) else {
            return false;
        };
        if !entry.process.boot_modes().includes(mode) || self.active_processes.contains(&handle.0) {
            return false;
        }
        self.active_processes.push(handle.0);
        true
    }

    /// Rebuild the active sensor list for `mode`.
    pub fn activate_sensors(&mut self, mode: BootMode) -> usize {
        self.active_sensors.clear();
        for handle in 0..self.sensors.len() {
            self.activate_sensor(SensorHandle(handle), mode);
        }
        self.active_sensors.len()
    }

    pub fn activate_sensor(&mut self, handle: SensorHandle, mode: BootMode) -> bool {
        let Some(entry) = self.sensors.get(handle.0) else {
            return false;
        };
        if !entry.sensor.boot_modes().includes(mode) || self.active_sensors.contains(&handle.0) {
            return false;
        }
        self.active_sensors.push(handle.0);
        true
    }

    pub fn is_process_active(&self, handle: ProcessHandle) -> bool {
        self.active_processes.contains(&handle.0)
    }

    pub fn is_sensor_active(&self, handle: SensorHandle) -> bool {
        self.active_sensors.contains(&handle.0)
    }

    // ===== PROCESS LIFECYCLE =====

    pub fn init_processes(&mut self) {
        for &index in &self.active_processes {
            self.processes[index].process.init();
        }
    }

    pub fn start_processes(&mut self, tick: TickInfo, device: &DeviceInfo, requests: &mut Vec<Request>) {
        self.refresh_board();
        let board = &mut self.board;
        for i in 0..self.active_processes.len() {
            let entry = &mut self.processes[self.active_processes[i]];
            if !entry.status.permits_start() {
                continue;
            }
            let mut ctx = ProcessContext::new(tick, device, &*board, requests);
            let status = entry.process.start(&mut ctx);
            log_info!("process {} started: {}", entry.process.name(), status);
            entry.status = status;
            board.update(EntityKind::Process, entry.process.name(), status);
        }
    }

    pub fn update_processes(&mut self, tick: TickInfo, device: &DeviceInfo, requests: &mut Vec<Request>) {
        self.refresh_board();
        let board = &mut self.board;
        for i in 0..self.active_processes.len() {
            let entry = &mut self.processes[self.active_processes[i]];
            if !entry.status.permits_update() {
                continue;
            }
            let mut ctx = ProcessContext::new(tick, device, &*board, requests);
            let status = entry.process.update(entry.status, &mut ctx);
            if status != entry.status {
                log_debug!("process {}: {} -> {}", entry.process.name(), entry.status, status);
                board.update(EntityKind::Process, entry.process.name(), status);
            }
            entry.status = status;
        }
    }

    /// Stop every active process; safe to repeat.
    pub fn stop_processes(&mut self) {
        for &index in &self.active_processes {
            let entry = &mut self.processes[index];
            entry.process.stop();
            entry.status = Status::Off;
        }
    }

    /// Hand a listener delivery to its process.
    ///
    /// Returns false when the process is unknown or not OK; the delivery is
    /// dropped in that case.
    pub fn deliver(
        &mut self,
        delivery: &Delivery,
        tick: TickInfo,
        device: &DeviceInfo,
        requests: &mut Vec<Request>,
    ) -> bool {
        let Some(handle) = self.find_process(&delivery.process) else {
            log_warn!("delivery to unknown process {}", delivery.process);
            return false;
        };
        if !self.processes[handle.0].status.is_ok() {
            log_debug!("delivery to {} dropped: {}", delivery.process, self.processes[handle.0].status);
            return false;
        }
        self.refresh_board();
        let entry = &mut self.processes[handle.0];
        let mut ctx = ProcessContext::new(tick, device, &self.board, requests);
        entry
            .process
            .receive_message(&delivery.destination, &delivery.buffer, &mut ctx);
        true
    }

    // ===== SENSOR LIFECYCLE =====

    pub fn init_sensors(&mut self) {
        for &index in &self.active_sensors {
            self.sensors[index].sensor.init();
        }
    }

    pub fn start_sensors(&mut self, now: Timestamp) {
        for &index in &self.active_sensors {
            let entry = &mut self.sensors[index];
            if !entry.status.permits_start() {
                continue;
            }
            let mut status = entry.sensor.start(now);
            if status.is_ok() {
                if entry.sensor.reading().is_none() {
                    log_warn!("sensor {} started without a reading", entry.sensor.name());
                    status = Status::NotConnected;
                } else {
                    entry.sensor.start_reading();
                }
            }
            log_info!("sensor {} started: {}", entry.sensor.name(), status);
            entry.status = status;
        }
    }

    /// Run one update pass over the active sensors and dispatch their events.
    pub fn update_sensors(&mut self, tick: TickInfo) {
        let mut triggers: Vec<(Event, ChannelFilter)> = Vec::new();
        for i in 0..self.active_sensors.len() {
            let clock = self.clock;
            let entry = &mut self.sensors[self.active_sensors[i]];
            if !entry.status.permits_update() {
                continue;
            }

            triggers.clear();
            let previous = entry.status;
            let (mut status, reading_taken) = {
                let mut ctx = SensorContext::new(tick.now, tick.wall_clock, clock, &mut triggers);
                let status = entry.sensor.update(previous, &mut ctx);
                (status, ctx.reading_taken())
            };

            if status.is_ok() && entry.sensor.reading().is_none() {
                log_warn!("sensor {} reported OK without a reading", entry.sensor.name());
                status = Status::NotConnected;
            }
            if status != previous {
                log_debug!("sensor {}: {} -> {}", entry.sensor.name(), previous, status);
            }
            entry.status = status;

            if reading_taken {
                entry.readings = entry.readings.wrapping_add(1);
                entry.last_reading_at = Some(tick.now);
            }

            if let Some(Reading::Clock(reading)) = entry.sensor.reading() {
                self.clock = status.is_ok().then_some(*reading);
            }

            if !status.is_ok() {
                continue;
            }
            for &(event, filter) in &triggers {
                if Self::dispatch(entry, event, filter, tick.now) > 0 {
                    entry.last_transmitted = entry.readings;
                }
            }
        }
    }

    fn dispatch(entry: &mut SensorEntry, event: Event, filter: ChannelFilter, now: Timestamp) -> usize {
        let SensorEntry { sensor, listeners, .. } = entry;
        let sensor: &dyn Sensor = sensor.as_ref();
        listeners.fire(event, filter, now, |trigger, buffer| sensor.format_reading(trigger, buffer))
    }

    /// Stop every active sensor; safe to repeat.
    pub fn stop_sensors(&mut self) {
        for &index in &self.active_sensors {
            let entry = &mut self.sensors[index];
            entry.sensor.stop();
            entry.status = Status::Off;
        }
        self.clock = None;
    }

    /// Fire an event on a sensor outside the update pass.
    ///
    /// Nothing is dispatched unless the sensor is OK.
    pub fn fire(&mut self, handle: SensorHandle, event: Event, filter: ChannelFilter, now: Timestamp) -> usize {
        match self.sensors.get_mut(handle.0) {
            Some(entry) if entry.status.is_ok() => Self::dispatch(entry, event, filter, now),
            _ => 0,
        }
    }

    /// Shared clock reading from the most recent OK clock sensor update.
    pub fn clock(&self) -> Option<ClockReading> {
        self.clock
    }

    // ===== LOOKUP =====

    pub fn find_process(&self, name: &str) -> Option<ProcessHandle> {
        self.processes
            .iter()
            .position(|e| e.process.name().eq_ignore_ascii_case(name))
            .map(ProcessHandle)
    }

    pub fn find_sensor(&self, name: &str) -> Option<SensorHandle> {
        self.sensors
            .iter()
            .position(|e| e.sensor.name().eq_ignore_ascii_case(name))
            .map(SensorHandle)
    }

    pub fn process(&self, handle: ProcessHandle) -> Option<&dyn Process> {
        self.processes.get(handle.0).map(|e| e.process.as_ref())
    }

    pub fn process_status(&self, handle: ProcessHandle) -> Option<Status> {
        self.processes.get(handle.0).map(|e| e.status)
    }

    pub fn sensor(&self, handle: SensorHandle) -> Option<&dyn Sensor> {
        self.sensors.get(handle.0).map(|e| e.sensor.as_ref())
    }

    pub fn sensor_status(&self, handle: SensorHandle) -> Option<Status> {
        self.sensors.get(handle.0).map(|e| e.status)
    }

    pub fn reading_counters(&self, handle: SensorHandle) -> Option<ReadingCounters> {
        self.sensors.get(handle.0).map(|e| ReadingCounters {
            readings: e.readings,
            last_transmitted: e.last_transmitted,
            last_reading_at: e.last_reading_at,
        })
    }

    /// Every process with its status, in registration order.
    pub fn processes(&self) -> impl Iterator<Item = (ProcessHandle, &dyn Process, Status)> + '_ {
        self.processes
            .iter()
            .enumerate()
            .map(|(i, e)| (ProcessHandle(i), e.process.as_ref(), e.status))
    }

    /// Every sensor with its status, in registration order.
    pub fn sensors(&self) -> impl Iterator<Item = (SensorHandle, &dyn Sensor, Status)> + '_ {
        self.sensors
            .iter()
            .enumerate()
            .map(|(i, e)| (SensorHandle(i), e.sensor.as_ref(), e.status))
    }

    /// Command `command` of process `process`.
    pub fn find_command(&self, process: &str, command: &str) -> Result<&'static Command, CommandError> {
        let handle = self
            .find_process(process)
            .ok_or_else(|| CommandError::UnknownProcess(process.to_string()))?;
        let collection = self.processes[handle.0]
            .process
            .commands()
            .ok_or_else(|| CommandError::NoCommands(process.to_string()))?;
        collection
            .find(command)
            .ok_or_else(|| CommandError::UnknownCommand(command.to_string()))
    }

    /// Command collections of every process that has one.
    pub fn command_collections(&self) -> impl Iterator<Item = (&'static str, &'static CommandCollection)> + '_ {
        self.processes
            .iter()
            .filter_map(|e| e.process.commands().map(|c| (e.process.name(), c)))
    }

    // ===== LISTENERS =====

    /// Binder `name` of a sensor.
    pub fn binder(&self, handle: SensorHandle, name: &str) -> Result<&'static EventBinder, RegistryError> {
        let sensor = self
            .sensor(handle)
            .ok_or_else(|| RegistryError::UnknownSensor(alloc::format!("#{}", handle.0)))?;
        find_binder(sensor.event_binders(), name).ok_or_else(|| RegistryError::UnknownTrigger(name.to_string()))
    }

    pub fn add_listener(
        &mut self,
        handle: SensorHandle,
        config: ListenerConfig,
        transport: Box<dyn ListenerTransport>,
    ) -> Result<(), RegistryError> {
        let entry = self
            .sensors
            .get_mut(handle.0)
            .ok_or_else(|| RegistryError::UnknownSensor(alloc::format!("#{}", handle.0)))?;
        entry.listeners.add(Listener::new(config, transport));
        Ok(())
    }

    pub fn listeners(&self, handle: SensorHandle) -> Option<&ListenerList> {
        self.sensors.get(handle.0).map(|e| &e.listeners)
    }

    pub fn clear_all_listeners(&mut self) {
        for entry in &mut self.sensors {
            entry.listeners.clear();
        }
    }

    /// Clear the listeners of the sensor called `name`.
    pub fn clear_sensor_listeners(&mut self, name: &str) -> bool {
        match self.find_sensor(name) {
            Some(handle) => {
                self.sensors[handle.0].listeners.clear();
                true
            }
            None => false,
        }
    }

    // ===== SETTINGS =====

    /// Every settings block with its owner's name, processes first.
    pub fn settings_blocks(&self) -> impl Iterator<Item = (&'static str, &dyn SettingsBlock)> + '_ {
        let processes = self
            .processes
            .iter()
            .filter_map(|e| e.process.settings().map(|b| (e.process.name(), b)));
        let sensors = self
            .sensors
            .iter()
            .filter_map(|e| e.sensor.settings().map(|b| (e.sensor.name(), b)));
        processes.chain(sensors)
    }

    /// Owner and item for a key, matched case-insensitively across all blocks.
    pub fn find_setting(&self, key: &str) -> Option<(SettingOwner, &'static SettingItem)> {
        for (i, e) in self.processes.iter().enumerate() {
            if let Some(item) = e.process.settings().and_then(|b| b.item(key)) {
                return Some((SettingOwner::Process(ProcessHandle(i)), item));
            }
        }
        for (i, e) in self.sensors.iter().enumerate() {
            if let Some(item) = e.sensor.settings().and_then(|b| b.item(key)) {
                return Some((SettingOwner::Sensor(SensorHandle(i)), item));
            }
        }
        None
    }

    fn block(&self, owner: SettingOwner) -> Option<&dyn SettingsBlock> {
        match owner {
            SettingOwner::Process(h) => self.processes.get(h.0)?.process.settings(),
            SettingOwner::Sensor(h) => self.sensors.get(h.0)?.sensor.settings(),
        }
    }

    fn block_mut(&mut self, owner: SettingOwner) -> Option<&mut dyn SettingsBlock> {
        match owner {
            SettingOwner::Process(h) => self.processes.get_mut(h.0)?.process.settings_mut(),
            SettingOwner::Sensor(h) => self.sensors.get_mut(h.0)?.sensor.settings_mut(),
        }
    }

    /// Name of the entity owning a settings block.
    pub fn owner_name(&self, owner: SettingOwner) -> &'static str {
        match owner {
            SettingOwner::Process(h) => self.processes[h.0].process.name(),
            SettingOwner::Sensor(h) => self.sensors[h.0].sensor.name(),
        }
    }

    pub fn setting_value(&self, key: &str) -> Option<FieldValue> {
        let (owner, item) = self.find_setting(key)?;
        self.block(owner)?.value(item.key)
    }

    /// `prompt [key]: value` for one setting.
    pub fn display_setting(&self, key: &str) -> SettingsResult<String> {
        let (owner, item) = self.find_setting(key).ok_or(SettingsError::NotFound)?;
        let value = self
            .block(owner)
            .and_then(|b| b.value(item.key))
            .ok_or(SettingsError::NotFound)?;
        Ok(alloc::format!("{} [{}]: {}", item.prompt, item.key, value))
    }

    /// Set one setting from text, returning its owner.
    pub fn set_setting(&mut self, key: &str, text: &str) -> SettingsResult<SettingOwner> {
        let (owner, item) = self.find_setting(key).ok_or(SettingsError::NotFound)?;
        let block = self.block_mut(owner).ok_or(SettingsError::NotFound)?;
        block.set_from_text(item.key, text)?;
        Ok(owner)
    }

    pub fn settings_for(&self, name: &str) -> Option<&dyn SettingsBlock> {
        if let Some(h) = self.find_process(name) {
            return self.processes[h.0].process.settings();
        }
        let h = self.find_sensor(name)?;
        self.sensors[h.0].sensor.settings()
    }

    pub fn settings_for_mut(&mut self, name: &str) -> Option<&mut dyn SettingsBlock> {
        if let Some(h) = self.find_process(name) {
            return self.processes[h.0].process.settings_mut();
        }
        let h = self.find_sensor(name)?;
        self.sensors[h.0].sensor.settings_mut()
    }

    pub fn reset_all_settings(&mut self) {
        for entry in &mut self.processes {
            if let Some(block) = entry.process.settings_mut() {
                block.reset_all();
            }
        }
        for entry in &mut self.sensors {
            if let Some(block) = entry.sensor.settings_mut() {
                block.reset_all();
            }
        }
    }

    /// Display lines for every block, headed by owner name.
    pub fn display_all_settings(&self, filter: Option<&str>, out: &mut String) -> usize {
        let mut shown = 0;
        for (name, block) in self.settings_blocks() {
            let mut lines = String::new();
            let count = block.display_all(filter, &mut lines);
            if count > 0 {
                out.push_str(name);
                out.push('\n');
                out.push_str(&lines);
                shown += count;
            }
        }
        shown
    }

    /// Restorable `key=value` lines for every block.
    pub fn dump_all_settings(&self, filter: Option<&str>, out: &mut String) -> usize {
        self.settings_blocks()
            .map(|(_, block)| block.dump_all(filter, out))
            .sum()
    }

    /// `{"<entity>":{"key":"value",...},...}` for every block.
    pub fn export_settings_json(&self) -> Value {
        let mut export = Map::new();
        for (name, block) in self.settings_blocks() {
            let values: Map<String, Value> = block
                .values_text()
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            export.insert(name.to_string(), Value::Object(values));
        }
        Value::Object(export)
    }

    /// Apply a bulk export, feeding each pair through `set_from_text`.
    ///
    /// Entity names are informational; keys are resolved globally.
    pub fn import_settings_json(&mut self, json: &Value) -> SettingsResult<ImportReport> {
        let entities = json.as_object().ok_or(SettingsError::Malformed)?;
        let mut report = ImportReport::default();
        for values in entities.values() {
            let values = values.as_object().ok_or(SettingsError::Malformed)?;
            for (key, value) in values {
                let text = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                match self.set_setting(key, &text) {
                    Ok(_) => report.applied += 1,
                    Err(_) => report.rejected.push(key.clone()),
                }
            }
        }
        Ok(report)
    }

    /// Load every block from `store`.
    pub fn load_settings(&mut self, store: &mut dyn SettingsStore) -> SettingsSetup {
        let mut setup = SettingsSetup::Loaded;
        let mut failed = false;

        let blocks = self
            .processes
            .iter_mut()
            .filter_map(|e| {
                let name = e.process.name();
                e.process.settings_mut().map(|b| (name, b))
            })
            .chain(self.sensors.iter_mut().filter_map(|e| {
                let name = e.sensor.name();
                e.sensor.settings_mut().map(|b| (name, b))
            }));

        for (name, block) in blocks {
            match load_block(store, name, block) {
                Ok(outcome) if outcome.needs_save() => {
                    log_info!("settings for {} reset to defaults: {:?}", name, outcome);
                    setup = SettingsSetup::ResetToDefaults;
                }
                Ok(_) => {}
                Err(err) => {
                    log_warn!("settings storage failed loading {}: {}", name, err);
                    failed = true;
                    break;
                }
            }
        }

        if failed {
            self.reset_all_settings();
            return SettingsSetup::StorageFailed;
        }
        setup
    }

    /// Save every block to `store`, returning the total bytes written.
    pub fn save_settings(&self, store: &mut dyn SettingsStore) -> Result<usize, StoreError> {
        let mut total = 0;
        for (name, block) in self.settings_blocks() {
            total += save_block(store, name, block)?;
        }
        Ok(total)
    }

    /// Save the block owned by `owner` only.
    pub fn save_owner_settings(&self, owner: SettingOwner, store: &mut dyn SettingsStore) -> Result<usize, StoreError> {
        match self.block(owner) {
            Some(block) => save_block(store, self.owner_name(owner), block),
            None => Ok(0),
        }
    }

    // ===== INTROSPECTION =====

    /// Status of every entity.
    pub fn status_board(&self) -> StatusBoard {
        let processes = self.processes.iter().map(ProcessEntry::board_entry);
        let sensors = self.sensors.iter().map(SensorEntry::board_entry);
        StatusBoard::new(processes.chain(sensors).collect())
    }

    /// Bring the shared board up to date without reallocating it.
    fn refresh_board(&mut self) {
        let processes = self.processes.iter().map(ProcessEntry::board_entry);
        let sensors = self.sensors.iter().map(SensorEntry::board_entry);
        self.board.refill(processes.chain(sensors));
    }

    /// `{"processes":[...],"sensors":[...]}` of OK entities.
    pub fn status_json(&self) -> Value {
        let board = self.status_board();
        json!({
            "processes": board.ok_processes_with_commands(),
            "sensors": board.ok_sensors(),
        })
    }

    /// Current readings of every OK sensor merged into one object.
    pub fn readings_json(&self, now: Timestamp) -> Value {
        let mut out = Map::new();
        for entry in &self.sensors {
            if entry.status.is_ok() {
                entry.sensor.append_json(now, &mut out);
            }
        }
        Value::Object(out)
    }

    /// Settings schema and values of one entity.
    pub fn settings_json(&self, name: &str) -> Option<Value> {
        let owner = self
            .find_process(name)
            .map(|h| self.processes[h.0].process.name())
            .or_else(|| self.find_sensor(name).map(|h| self.sensors[h.0].sensor.name()))?;
        self.settings_for(name).map(|block| block.to_json(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Channels, Trigger};
    use crate::field::validators;
    use crate::listener::ListenerBuffer;
    use crate::settings::MemoryStore;
    use crate::status::BootModes;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    crate::settings_block! {
        struct WidgetSettings => "widget", "Widget" {
            rate: i32 = 5 => "widgetrate", "Widget rate", validate = validators::positive;
        }
    }

    struct Widget {
        name: &'static str,
        modes: BootModes,
        next: Status,
        calls: Rc<RefCell<Vec<String>>>,
        settings: Option<WidgetSettings>,
    }

    impl Widget {
        fn new(name: &'static str, calls: &Rc<RefCell<Vec<String>>>) -> Self {
            Self { name, modes: BootModes::all(), next: Status::Ok, calls: calls.clone(), settings: None }
        }

        fn log(&self, what: &str) {
            self.calls.borrow_mut().push(alloc::format!("{}.{}", self.name, what));
        }
    }

    impl crate::entity::Entity for Widget {
        fn name(&self) -> &'static str {
            self.name
        }

        fn settings(&self) -> Option<&dyn SettingsBlock> {
            self.settings.as_ref().map(|s| s as &dyn SettingsBlock)
        }

        fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
            self.settings.as_mut().map(|s| s as &mut dyn SettingsBlock)
        }
    }

    impl Process for Widget {
        fn boot_modes(&self) -> BootModes {
            self.modes
        }

        fn start(&mut self, _ctx: &mut ProcessContext<'_>) -> Status {
            self.log("start");
            self.next
        }

        fn update(&mut self, status: Status, _ctx: &mut ProcessContext<'_>) -> Status {
            self.log("update");
            status
        }

        fn stop(&mut self) {
            self.log("stop");
        }
    }

    struct Thermo {
        reading: Option<Reading>,
        fire: bool,
    }

    impl crate::entity::Entity for Thermo {
        fn name(&self) -> &'static str {
            "thermo"
        }
    }

    impl Sensor for Thermo {
        fn start(&mut self, _now: Timestamp) -> Status {
            self.reading = Some(Reading::Environment(Default::default()));
            Status::Ok
        }

        fn update(&mut self, status: Status, ctx: &mut SensorContext<'_>) -> Status {
            ctx.record_reading();
            if self.fire {
                ctx.fire(Event::Change, ChannelFilter::Exact(Channels::bit(0)));
            }
            status
        }

        fn reading(&self) -> Option<&Reading> {
            self.reading.as_ref()
        }

        fn format_reading(&self, _trigger: &Trigger, buffer: &mut ListenerBuffer) {
            buffer.set_message("21.0");
        }
    }

    fn run_start(registry: &mut Registry) {
        let device = DeviceInfo::default();
        let mut requests = Vec::new();
        registry.start_processes(TickInfo::default(), &device, &mut requests);
    }

    fn run_update(registry: &mut Registry) {
        let device = DeviceInfo::default();
        let mut requests = Vec::new();
        registry.update_processes(TickInfo::default(), &device, &mut requests);
    }

    #[test]
    fn activation_follows_boot_mode_mask() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let mut config_only = Widget::new("config", &calls);
        config_only.modes = BootModes::CONFIG;
        registry.register_process(Box::new(Widget::new("always", &calls))).unwrap();
        registry.register_process(Box::new(config_only)).unwrap();

        assert_eq!(registry.activate_processes(BootMode::Active), 1);
        assert_eq!(registry.activate_processes(BootMode::Config), 2);
    }

    #[test]
    fn lifecycle_respects_status_gates() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let mut broken = Widget::new("broken", &calls);
        broken.next = Status::NotConnected;
        let ok = registry.register_process(Box::new(Widget::new("ok", &calls))).unwrap();
        let bad = registry.register_process(Box::new(broken)).unwrap();
        registry.activate_processes(BootMode::Active);

        run_start(&mut registry);
        run_update(&mut registry);
        run_start(&mut registry);

        assert_eq!(registry.process_status(ok), Some(Status::Ok));
        assert_eq!(registry.process_status(bad), Some(Status::NotConnected));
        assert_eq!(*calls.borrow(), ["ok.start", "broken.start", "ok.update"]);

        registry.stop_processes();
        registry.stop_processes();
        assert_eq!(registry.process_status(bad), Some(Status::Off));
        assert_eq!(calls.borrow().iter().filter(|c| c.ends_with(".stop")).count(), 4);
    }

    #[test]
    fn process_board_is_refilled_in_place() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let ok = registry.register_process(Box::new(Widget::new("ok", &calls))).unwrap();
        registry.activate_processes(BootMode::Active);
        run_start(&mut registry);
        let storage = registry.board.entries().as_ptr();

        registry.processes[ok.0].status = Status::Off;
        run_update(&mut registry);

        assert_eq!(registry.board.entries().as_ptr(), storage);
        assert_eq!(registry.board.process_status("ok"), Some(Status::Off));
    }

    #[test]
    fn duplicate_names_and_keys_are_rejected() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let mut first = Widget::new("first", &calls);
        first.settings = Some(WidgetSettings::default());
        let mut second = Widget::new("second", &calls);
        second.settings = Some(WidgetSettings::default());

        registry.register_process(Box::new(first)).unwrap();
        assert_eq!(
            registry.register_process(Box::new(Widget::new("FIRST", &calls))).err(),
            Some(RegistryError::DuplicateName("FIRST".into()))
        );
        assert_eq!(
            registry.register_process(Box::new(second)).err(),
            Some(RegistryError::DuplicateSetting("widgetrate"))
        );
    }

    #[test]
    fn settings_are_global_and_persist() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let mut widget = Widget::new("widget", &calls);
        widget.settings = Some(WidgetSettings::default());
        registry.register_process(Box::new(widget)).unwrap();

        let mut store = MemoryStore::new();
        assert_eq!(registry.load_settings(&mut store), SettingsSetup::ResetToDefaults);

        registry.set_setting("WIDGETRATE", "9").unwrap();
        assert_eq!(registry.set_setting("widgetrate", "0"), Err(SettingsError::Invalid {
            reason: crate::errors::FieldError::Rejected
        }));
        assert_eq!(registry.setting_value("widgetrate"), Some(FieldValue::Int(9)));
        assert_eq!(registry.display_setting("widgetrate").unwrap(), "Widget rate [widgetrate]: 9");

        registry.save_settings(&mut store).unwrap();
        registry.reset_all_settings();
        assert_eq!(registry.setting_value("widgetrate"), Some(FieldValue::Int(5)));
        assert_eq!(registry.load_settings(&mut store), SettingsSetup::Loaded);
        assert_eq!(registry.setting_value("widgetrate"), Some(FieldValue::Int(9)));
    }

    #[test]
    fn import_reports_rejections() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let mut widget = Widget::new("widget", &calls);
        widget.settings = Some(WidgetSettings::default());
        registry.register_process(Box::new(widget)).unwrap();

        let export = registry.export_settings_json();
        assert_eq!(export["widget"]["widgetrate"], "5");

        let report = registry
            .import_settings_json(&json!({"widget": {"widgetrate": 12, "nosuch": "1"}}))
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected, ["nosuch"]);
        assert_eq!(registry.setting_value("widgetrate"), Some(FieldValue::Int(12)));
    }

    #[test]
    fn sensor_events_reach_listeners_after_update() {
        let mut registry = Registry::new();
        let thermo = registry
            .register_sensor(Box::new(Thermo { reading: None, fire: true }))
            .unwrap();
        registry.activate_sensors(BootMode::Active);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        registry
            .add_listener(
                thermo,
                ListenerConfig::new("display", Trigger::new(Event::Change, Channels::bit(0))),
                Box::new(move |dest: &str, buffer: &ListenerBuffer| {
                    sink.borrow_mut().push(alloc::format!("{}={}", dest, buffer.message()));
                }),
            )
            .unwrap();

        registry.start_sensors(0);
        registry.update_sensors(TickInfo { now: 10, ..Default::default() });

        assert_eq!(*seen.borrow(), ["display=21.0"]);
        let counters = registry.reading_counters(thermo).unwrap();
        assert_eq!(counters.readings, 1);
        assert_eq!(counters.last_transmitted, 1);
        assert_eq!(counters.last_reading_at, Some(10));

        assert!(registry.clear_sensor_listeners("THERMO"));
        registry.update_sensors(TickInfo { now: 20, ..Default::default() });
        assert_eq!(seen.borrow().len(), 1);
        assert!(!registry.clear_sensor_listeners("missing"));
    }

    #[test]
    fn ok_without_reading_is_demoted() {
        struct Liar;
        impl crate::entity::Entity for Liar {
            fn name(&self) -> &'static str {
                "liar"
            }
        }
        impl Sensor for Liar {
            fn start(&mut self, _now: Timestamp) -> Status {
                Status::Ok
            }
            fn update(&mut self, status: Status, _ctx: &mut SensorContext<'_>) -> Status {
                status
            }
            fn reading(&self) -> Option<&Reading> {
                None
            }
        }

        let mut registry = Registry::new();
        let liar = registry.register_sensor(Box::new(Liar)).unwrap();
        registry.activate_sensors(BootMode::Active);
        registry.start_sensors(0);
        assert_eq!(registry.sensor_status(liar), Some(Status::NotConnected));
    }

    #[test]
    fn status_json_lists_ok_entities() {
        let mut registry = Registry::new();
        registry.register_sensor(Box::new(Thermo { reading: None, fire: false })).unwrap();
        registry.activate_sensors(BootMode::Active);
        registry.start_sensors(0);
        assert_eq!(registry.status_json(), json!({"processes": [], "sensors": ["thermo"]}));
    }
}
