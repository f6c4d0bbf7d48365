//! MQTT process and connector
//!
//! [`MqttProcess`] owns the broker settings and reports the link state the
//! kernel's publisher sees. Listener deliveries addressed to it are published
//! on the listener's destination topic.
//!
//! With the `mqtt` feature, [`MqttConnector`] provides the link itself on top
//! of the synchronous `rumqttc` client. A background thread drives the
//! client's event loop, tracks the connection flag and forwards messages
//! arriving on the device's command topic to [`InboundCommands`].

use clb_core::commands::{Command, CommandBuffer, CommandCollection, CommandItem};
use clb_core::entity::{Entity, Process, ProcessContext};
use clb_core::field::validators;
use clb_core::listener::ListenerBuffer;
use clb_core::settings::SettingsBlock;
use clb_core::{CommandError, CommandResult, Kernel, Status};

use crate::TopicScheme;

/// Status while the broker link is down
pub const WAITING_FOR_MQTT: Status = Status::Waiting("MQTT");

/// Default broker port
pub const DEFAULT_PORT: u16 = 1883;

clb_core::settings_block! {
    /// Settings for [`MqttProcess`]
    pub struct MqttSettings => "mqtt", "MQTT connection" {
        active: bool = true => "mqttactive", "MQTT enabled (yes or no)";
        device_name: String = String::from("CLB-000000") => "mqttdevicename", "Device name",
            validate = validators::topic_safe;
        host: String = String::new() => "mqtthost", "MQTT host";
        port: i32 = DEFAULT_PORT as i32 => "mqttport", "MQTT port", validate = validators::port_number;
        topic_prefix: String = String::from("lb") => "mqtttopicprefix", "MQTT topic prefix",
            validate = validators::topic_safe;
    }
}

static SEND_ITEMS: [CommandItem; 2] = [
    CommandItem::text("topic", "Topic to publish on"),
    CommandItem::text("text", "Payload to publish"),
];

fn send(kernel: &mut Kernel, buffer: &CommandBuffer) -> CommandResult<()> {
    let topic = buffer.text("topic").unwrap_or_default();
    let text = buffer.text("text").unwrap_or_default();
    kernel.publish(topic, text).map_err(CommandError::Publish)
}

static MQTT_COMMANDS: CommandCollection = CommandCollection {
    description: "MQTT publishing",
    commands: &[Command {
        name: "send",
        description: "Publish text on a topic",
        items: &SEND_ITEMS,
        action: send,
    }],
};

/// Broker link process
#[derive(Debug, Default)]
pub struct MqttProcess {
    settings: MqttSettings,
}

impl MqttProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: MqttSettings) -> Self {
        Self { settings }
    }

    pub fn config(&self) -> MqttConfig {
        MqttConfig::from_settings(&self.settings)
    }

    fn link_status(&self, ctx: &ProcessContext<'_>) -> Status {
        if !self.settings.active {
            Status::Off
        } else if ctx.link_connected() {
            Status::Ok
        } else {
            WAITING_FOR_MQTT
        }
    }
}

impl Entity for MqttProcess {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn settings(&self) -> Option<&dyn SettingsBlock> {
        Some(&self.settings)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
        Some(&mut self.settings)
    }

    fn status_message(&self, status: Status) -> String {
        match status {
            Status::Ok => format!("connected to {}", self.settings.host),
            Status::Off => "MQTT off".to_string(),
            WAITING_FOR_MQTT => "waiting for MQTT connection".to_string(),
            other => other.to_string(),
        }
    }
}

impl Process for MqttProcess {
    fn commands(&self) -> Option<&'static CommandCollection> {
        Some(&MQTT_COMMANDS)
    }

    fn start(&mut self, ctx: &mut ProcessContext<'_>) -> Status {
        self.link_status(ctx)
    }

    fn update(&mut self, status: Status, ctx: &mut ProcessContext<'_>) -> Status {
        let next = self.link_status(ctx);
        if next != status {
            log::info!("mqtt: {} -> {}", status, next);
        }
        next
    }

    fn receive_message(&mut self, destination: &str, buffer: &ListenerBuffer, ctx: &mut ProcessContext<'_>) {
        ctx.publish(destination, &buffer.message);
    }
}

/// Connection parameters taken from [`MqttSettings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Client id and device segment of every topic
    pub device_name: String,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    pub fn new(host: &str, port: u16, device_name: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            device_name: device_name.to_string(),
            topic_prefix: String::from("lb"),
            keep_alive_secs: 30,
        }
    }

    pub fn from_settings(settings: &MqttSettings) -> Self {
        let port = u16::try_from(settings.port).unwrap_or(DEFAULT_PORT);
        Self {
            topic_prefix: settings.topic_prefix.clone(),
            ..Self::new(&settings.host, port, &settings.device_name)
        }
    }

    pub fn topics(&self) -> TopicScheme {
        TopicScheme::new(&self.topic_prefix, &self.device_name)
    }
}

#[cfg(feature = "mqtt")]
pub use connector::{InboundCommands, MqttConnector};

#[cfg(feature = "mqtt")]
mod connector {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};

    use super::MqttConfig;
    use crate::{ConnectionStats, Connector, ConnectorError};

    const REQUEST_CAPACITY: usize = 10;
    const RETRY_DELAY: Duration = Duration::from_secs(1);

    /// [`Connector`] over a `rumqttc` client
    pub struct MqttConnector {
        client: Client,
        connected: Arc<AtomicBool>,
        stats: Arc<Mutex<ConnectionStats>>,
    }

    /// Command envelopes received on the device's command topic
    pub struct InboundCommands {
        receiver: Receiver<String>,
    }

    impl InboundCommands {
        /// Next received envelope, if any.
        pub fn try_next(&mut self) -> Option<String> {
            self.receiver.try_recv().ok()
        }
    }

    impl MqttConnector {
        /// Start the client and its event thread.
        pub fn connect(config: &MqttConfig) -> Result<(Self, InboundCommands), ConnectorError> {
            if config.host.is_empty() {
                return Err(ConnectorError::ConfigError("no MQTT host".into()));
            }
            let mut options = MqttOptions::new(config.device_name.as_str(), config.host.as_str(), config.port);
            options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

            let (client, connection) = Client::new(options, REQUEST_CAPACITY);
            let connected = Arc::new(AtomicBool::new(false));
            let stats = Arc::new(Mutex::new(ConnectionStats::default()));
            let (sender, receiver) = mpsc::channel();

            let worker = EventWorker {
                client: client.clone(),
                inbound_topic: config.topics().inbound_topic(),
                connected: Arc::clone(&connected),
                stats: Arc::clone(&stats),
                sender,
            };
            thread::Builder::new()
                .name("mqtt-events".into())
                .spawn(move || worker.run(connection))
                .map_err(|err| ConnectorError::ConfigError(err.to_string()))?;

            Ok((Self { client, connected, stats }, InboundCommands { receiver }))
        }
    }

    impl Connector for MqttConnector {
        fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), ConnectorError> {
            let result = if self.is_connected() {
                self.client
                    .try_publish(topic, QoS::AtLeastOnce, false, data.to_vec())
                    .map_err(|err| ConnectorError::ProtocolError(err.to_string()))
            } else {
                Err(ConnectorError::NotConnected)
            };
            if let Ok(mut stats) = self.stats.lock() {
                stats.record(data.len(), &result);
            }
            result
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Acquire)
        }

        fn stats(&self) -> ConnectionStats {
            self.stats.lock().map(|stats| stats.clone()).unwrap_or_default()
        }
    }

    struct EventWorker {
        client: Client,
        inbound_topic: String,
        connected: Arc<AtomicBool>,
        stats: Arc<Mutex<ConnectionStats>>,
        sender: Sender<String>,
    }

    impl EventWorker {
        fn run(self, mut connection: Connection) {
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connected(),
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let text = String::from_utf8_lossy(&publish.payload).into_owned();
                        if self.sender.send(text).is_err() {
                            log::debug!("mqtt: inbound receiver dropped, stopping");
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if self.connected.swap(false, Ordering::AcqRel) {
                            log::warn!("mqtt: connection lost: {}", err);
                        }
                        if let Ok(mut stats) = self.stats.lock() {
                            stats.last_error = Some(err.to_string());
                        }
                        thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }

        fn on_connected(&self) {
            self.connected.store(true, Ordering::Release);
            if let Ok(mut stats) = self.stats.lock() {
                stats.reconnections += 1;
            }
            log::info!("mqtt: connected, subscribing to {}", self.inbound_topic);
            if let Err(err) = self.client.try_subscribe(self.inbound_topic.as_str(), QoS::AtLeastOnce) {
                log::warn!("mqtt: subscribe failed: {}", err);
            }
        }
    }
}
