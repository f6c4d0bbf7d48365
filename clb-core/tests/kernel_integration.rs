//! Kernel integration tests
//!
//! Drive a fully wired kernel through the console and simulated hardware and
//! check what reaches listeners, the console and the publisher.
//!
//! ## Test Scope
//!
//! - Sensor changes and calendar events routed to listeners
//! - Console lines typed into the console process
//! - Sensor test sessions
//! - Status and restart handling
//! - Startup settings report and control messages

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use clb_core::events::Event;
use clb_core::hal::EnvironmentSample;
use clb_core::listener::ListenerConfig;
use clb_core::processes::{MessagesSettings, Severity};
use clb_core::settings::store::save_block;
use clb_core::settings::MemoryStore;
use clb_core::{RegistryError, RestartMode, SettingsSetup, Status};
use serde_json::Value;

use common::{complete_store, FailingStore, Recorder, Rig, ROOM};

const ESC: u8 = 0x1b;

fn sensor_status(rig: &Rig, name: &str) -> Option<Status> {
    let registry = rig.kernel.registry();
    registry.find_sensor(name).and_then(|h| registry.sensor_status(h))
}

#[test]
fn fitted_sensors_start_ok() {
    let mut rig = Rig::fitted();
    assert_eq!(sensor_status(&rig, "bme280"), Some(Status::Ok));
    assert_eq!(sensor_status(&rig, "pir"), Some(Status::Ok));
    assert_eq!(sensor_status(&rig, "clock"), Some(Status::Waiting("time")));

    rig.step(0);
    assert_eq!(sensor_status(&rig, "clock"), Some(Status::Ok));
}

#[test]
fn unfitted_sensors_report_not_fitted() {
    let mut rig = Rig::boot(MemoryStore::new());
    rig.step(0);
    let status = rig.console("status");
    assert!(status.contains("bme280: BME280 not fitted"));
    assert!(status.contains("pir: PIR sensor not fitted"));
    assert!(status.contains("clock: 2024-01-01 12:00:00"));
}

#[test]
fn typed_addlistener_routes_changes_to_console() {
    let mut rig = Rig::fitted();
    rig.input.type_text("addlistener bme280 tempchanged console kitchen\r");
    rig.step(1000);
    assert_eq!(rig.sink.take(), "listener added\n");

    // Below the half-degree threshold
    rig.environment.set_sample(EnvironmentSample::new(20.3, 50.0, 1000.0));
    rig.step(1000);
    assert_eq!(rig.sink.take(), "");

    rig.environment.set_sample(EnvironmentSample::new(21.0, 50.0, 1000.0));
    rig.step(1000);
    assert_eq!(rig.sink.take(), "21.0\n");

    let listing = rig.console("listeners");
    assert!(listing.contains("bme280: change"));
    assert!(listing.contains("\"kitchen\" (1 sent)"));
}

#[test]
fn humidity_change_skips_temperature_listener() {
    let mut rig = Rig::fitted();
    let recorder = Recorder::new();
    let handle = rig.kernel.registry().find_sensor("bme280").unwrap();
    let binder = rig.kernel.registry().binder(handle, "tempchanged").unwrap();
    rig.kernel
        .add_listener_transport("bme280", ListenerConfig::new("t", binder.trigger), Box::new(recorder.clone()))
        .unwrap();

    rig.step(1000);
    recorder.take();

    rig.environment.set_sample(EnvironmentSample::new(20.0, 60.0, 1000.0));
    rig.step(1000);
    assert!(recorder.take().is_empty());
}

#[test]
fn motion_listeners_keep_preset_messages() {
    let mut rig = Rig::fitted();
    rig.kernel.add_listener("pir", "triggered", "console", "hall", Some("someone is here")).unwrap();
    rig.kernel.add_listener("pir", "cleared", "console", "hall", Some("all quiet")).unwrap();

    rig.step(100);
    assert_eq!(rig.sink.take(), "");

    rig.pin.set_level(true);
    rig.step(100);
    assert_eq!(rig.sink.take(), "someone is here\n");

    rig.pin.set_level(false);
    rig.step(100);
    assert_eq!(rig.sink.take(), "all quiet\n");
}

#[test]
fn clock_minute_listener_fires_on_boundaries() {
    let mut rig = Rig::fitted();
    let recorder = Recorder::new();
    let handle = rig.kernel.registry().find_sensor("clock").unwrap();
    let binder = rig.kernel.registry().binder(handle, "min").unwrap();
    assert_eq!(binder.trigger.event, Event::Minute);
    rig.kernel
        .add_listener_transport("clock", ListenerConfig::new("chime", binder.trigger), Box::new(recorder.clone()))
        .unwrap();

    rig.step(0);
    let first = recorder.take();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].message, "12:00:00");
    assert_eq!(first[0].destination, "chime");

    rig.step(1000);
    assert!(recorder.take().is_empty());

    rig.step(59_000);
    let next = recorder.take();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].message, "12:01:00");
    assert_eq!(next[0].value, 1.0);
}

#[test]
fn readings_merge_every_ok_sensor() {
    let mut rig = Rig::fitted();
    rig.step(1000);
    let readings: Value = serde_json::from_str(rig.console("readings").trim_end()).unwrap();
    assert_eq!(readings["time"], "2024-01-01 12:00:01");
    assert_eq!(readings["pir"], "0");
    assert_eq!(readings["temp"], 20.0);
    assert_eq!(readings["humidity"], 50.0);
    assert_eq!(readings["pressure"], 1000.0);
}

#[test]
fn sensor_test_reports_until_escape() {
    let mut rig = Rig::fitted();
    rig.step(1000);
    assert_eq!(rig.console("test bme280"), "testing sensor; press ESC or enter endtest to stop\n");

    rig.step(10);
    let output = rig.sink.take();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("bme280: Temp:20.00"));
    let reading: Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(reading["temp"], ROOM.temperature as f64);

    // Too soon for another report
    rig.step(10);
    assert_eq!(rig.sink.take(), "");

    rig.input.type_byte(ESC);
    rig.step(10);
    assert_eq!(rig.sink.take(), "sensor test ended\n");
    assert!(!rig.kernel.sensor_test_active());
}

#[test]
fn failed_reads_demote_sensor() {
    let mut rig = Rig::fitted();
    rig.step(1000);
    rig.environment.fail_reads();
    rig.step(1000);
    assert_eq!(sensor_status(&rig, "bme280"), Some(Status::NotConnected));
    assert!(rig.console("status").contains("bme280: BME280 not connected"));
}

#[test]
fn restart_and_clear_requests() {
    let mut rig = Rig::fitted();
    assert_eq!(rig.console("restart"), "restarting\n");
    assert_eq!(rig.kernel.take_restart_request(), Some(RestartMode::Cold));
    assert_eq!(rig.kernel.take_restart_request(), None);

    rig.console("clear");
    assert_eq!(rig.kernel.take_restart_request(), Some(RestartMode::Cold));
    assert!(rig.console("bme280sensorfitted").ends_with(": no\n"));
}

#[test]
fn settings_changes_persist_through_console() {
    let mut rig = Rig::fitted();
    assert_eq!(rig.console("bme280tempchangetoxmit=1.5"), "setting set OK\n");
    assert_eq!(rig.console("bme280tempchangetoxmit=-1"), "setting value invalid\n");
    let dump = rig.console("dump bme280temp");
    assert!(dump.contains("bme280tempchangetoxmit=1.5"));
}

#[test]
fn startup_reports_settings_loaded() {
    let rig = Rig::boot(complete_store());
    assert_eq!(rig.kernel.settings_setup(), Some(SettingsSetup::Loaded));
    assert!(rig.startup.starts_with("Settings loaded OK\n"), "{}", rig.startup);
    assert!(rig.startup.ends_with("Type help and press enter for help\n\n"));
}

#[test]
fn startup_reports_defaults_for_missing_records() {
    let rig = Rig::fitted();
    assert_eq!(rig.kernel.settings_setup(), Some(SettingsSetup::ResetToDefaults));
    assert!(rig.startup.starts_with("Settings reset to defaults\n"), "{}", rig.startup);
}

#[test]
fn startup_reports_storage_failure() {
    let unreadable = Rig::boot(FailingStore { reads: false });
    assert_eq!(unreadable.kernel.settings_setup(), Some(SettingsSetup::StorageFailed));
    assert!(unreadable.startup.starts_with("Settings file system fail\n"));

    let unwritable = Rig::boot(FailingStore { reads: true });
    assert_eq!(unwritable.kernel.settings_setup(), Some(SettingsSetup::StorageFailed));
    assert!(unwritable.startup.starts_with("Settings file system fail\n"));
}

#[test]
fn startup_report_respects_messages_switch() {
    let mut store = complete_store();
    save_block(&mut store, "messages", &MessagesSettings { active: false }).unwrap();
    let rig = Rig::boot(store);
    assert!(!rig.startup.contains("Settings"));
    assert!(!rig.startup.contains("Start complete"));
}

#[test]
fn bound_handlers_see_control_messages() {
    let mut rig = Rig::fitted();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    rig.kernel
        .bind_message_handler(move |number: i32, severity: Severity, text: &str| {
            log.borrow_mut().push((number, severity, text.to_string()))
        })
        .unwrap();
    for _ in 0..3 {
        rig.kernel.bind_message_handler(|_: i32, _: Severity, _: &str| {}).unwrap();
    }
    assert_eq!(
        rig.kernel.bind_message_handler(|_: i32, _: Severity, _: &str| {}),
        Err(RegistryError::HandlersFull(4))
    );

    rig.kernel.control_message(21, Severity::Alert, "sensor offline");

    assert_eq!(rig.sink.take(), "Alert: 21 sensor offline\n");
    assert_eq!(*seen.borrow(), [(21, Severity::Alert, "sensor offline".to_string())]);
}
