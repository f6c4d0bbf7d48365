//! Full-kernel runs of the MQTT and registration processes.

use clb_connectors::mqtt::WAITING_FOR_MQTT;
use clb_connectors::{MqttProcess, RegistrationProcess};
use clb_core::output::MemorySink;
use clb_core::publish::MemoryPublisher;
use clb_core::sensors::ClockSensor;
use clb_core::time::MockTimeSource;
use clb_core::{Kernel, KernelConfig, Status};
use serde_json::Value;

const NOON: u64 = 1_704_110_400_000;

struct Rig {
    kernel: Kernel,
    sink: MemorySink,
    publisher: MemoryPublisher,
}

fn rig(link: bool) -> Rig {
    let sink = MemorySink::new();
    let publisher = MemoryPublisher::default();
    publisher.set_connected(link);
    let mut kernel = Kernel::builder(KernelConfig::default())
        .output(sink.clone())
        .publisher(publisher.clone())
        .time_source(MockTimeSource::wall_clock(NOON))
        .build();
    kernel.register_process(Box::new(MqttProcess::new())).unwrap();
    kernel.register_process(Box::new(RegistrationProcess::new())).unwrap();
    kernel.register_sensor(Box::new(ClockSensor::new())).unwrap();
    kernel.setup();
    sink.take();
    Rig { kernel, sink, publisher }
}

fn status(kernel: &Kernel, name: &str) -> Option<Status> {
    let registry = kernel.registry();
    registry.find_process(name).and_then(|h| registry.process_status(h))
}

#[test]
fn registers_once_link_and_clock_are_up() {
    let mut rig = rig(true);
    rig.kernel.tick();
    assert_eq!(status(&rig.kernel, "registration"), Some(WAITING_FOR_MQTT));
    assert!(rig.publisher.sent().is_empty());

    rig.kernel.tick();
    assert_eq!(status(&rig.kernel, "registration"), Some(Status::Ok));
    let sent = rig.publisher.take();
    let topics: Vec<&str> = sent.iter().map(|p| p.topic.as_str()).collect();
    assert_eq!(topics, ["registered", "connected"]);

    let registration: Value = serde_json::from_str(&sent[0].payload).unwrap();
    assert_eq!(registration["name"], rig.kernel.device().name.as_str());
    assert_eq!(registration["sensors"], serde_json::json!(["clock"]));

    rig.kernel.tick();
    assert!(rig.publisher.sent().is_empty());
}

#[test]
fn link_drop_triggers_reregistration() {
    let mut rig = rig(true);
    rig.kernel.tick();
    rig.kernel.tick();
    rig.publisher.take();

    rig.publisher.set_connected(false);
    rig.kernel.tick();
    assert_eq!(status(&rig.kernel, "mqtt"), Some(WAITING_FOR_MQTT));
    assert_eq!(status(&rig.kernel, "registration"), Some(WAITING_FOR_MQTT));

    rig.publisher.set_connected(true);
    rig.kernel.tick();
    rig.kernel.tick();
    assert_eq!(status(&rig.kernel, "registration"), Some(Status::Ok));
    assert_eq!(rig.publisher.take().len(), 2);
}

#[test]
fn getsettings_displays_block_json() {
    let mut rig = rig(true);
    rig.kernel.tick();
    rig.kernel.tick();
    rig.sink.take();

    rig.kernel.perform_console_line(r#"{"registration":{"getsettings":{"name":"mqtt"}}}"#);
    let shown = rig.sink.take();
    let json: Value = serde_json::from_str(shown.trim_end()).unwrap();
    assert!(shown.contains("mqtthost"));
    assert!(json.is_object());
}

#[test]
fn send_command_publishes_through_link() {
    let mut rig = rig(true);
    rig.kernel.tick();

    rig.kernel.perform_console_line(r#"{"mqtt":{"send":{"topic":"lights","text":"on"}}}"#);
    let sent = rig.publisher.take();
    assert!(sent.iter().any(|p| p.topic == "lights" && p.payload == "on"));
}

#[test]
fn send_fails_without_link() {
    let mut rig = rig(false);
    rig.kernel.tick();
    rig.kernel.perform_console_line(r#"{"mqtt":{"send":{"topic":"lights","text":"on"}}}"#);
    assert!(rig.sink.take().starts_with("command failed"));
}
