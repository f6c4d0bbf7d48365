//! Network-facing processes for Connected Little Boxes
//!
//! ## Overview
//!
//! The kernel in `clb-core` only knows a [`RemotePublisher`]: something
//! that can publish a payload on a topic and forward a command envelope to
//! another device. This crate supplies the processes that sit on top of that
//! link and the adapters that implement it.
//!
//! - [`mqtt::MqttProcess`] tracks the link, owns the broker settings and
//!   publishes listener deliveries.
//! - [`registration::RegistrationProcess`] announces the device once the
//!   link and the clock are both up.
//! - [`ConnectorPublisher`] turns any [`Connector`] into a
//!   [`RemotePublisher`] with the device's topic layout.
//! - `MqttConnector` (feature `mqtt`) is a [`Connector`] backed by `rumqttc`.
//!
//! ## Topic layout
//!
//! | Message              | Topic                                  |
//! |----------------------|----------------------------------------|
//! | device publication   | `<prefix>/<device>/<topic>`            |
//! | command to a device  | `<prefix>/<destination>/command`       |
//!
//! ## Example Usage
//!
//! ```ignore
//! use clb_connectors::{ConnectorPublisher, TopicScheme};
//! use clb_connectors::mqtt::{MqttConfig, MqttConnector};
//! use clb_core::{Kernel, KernelConfig};
//!
//! let config = MqttConfig::new("broker.local", 1883, "CLB-000001");
//! let (connector, mut inbound) = MqttConnector::connect(&config)?;
//! let publisher = ConnectorPublisher::new(connector, TopicScheme::new("lb", "CLB-000001"));
//!
//! let mut kernel = Kernel::builder(KernelConfig::default()).publisher(publisher).build();
//! kernel.setup();
//! loop {
//!     while let Some(envelope) = inbound.try_next() {
//!         let _ = kernel.act_on_json(&envelope);
//!     }
//!     kernel.tick();
//! }
//! # Ok::<(), clb_connectors::ConnectorError>(())
//! ```

pub mod mqtt;
pub mod registration;

pub use mqtt::{MqttProcess, MqttSettings};
pub use registration::{RegistrationProcess, RegistrationSettings};

use clb_core::{PublishError, RemotePublisher};
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Buffer full")]
    BufferFull,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<ConnectorError> for PublishError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::NotConnected => PublishError::NotConnected,
            other => PublishError::Rejected(other.to_string()),
        }
    }
}

/// Trait for all protocol connectors
pub trait Connector {
    /// Send a payload on a fully-qualified topic
    fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), ConnectorError>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Get connection statistics
    fn stats(&self) -> ConnectionStats;
}

/// Connection statistics common to all connectors
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Total messages sent successfully
    pub messages_sent: u64,
    /// Total messages failed to send
    pub messages_failed: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Number of reconnections
    pub reconnections: u32,
    /// Last error message
    pub last_error: Option<String>,
}

impl ConnectionStats {
    /// Record the outcome of one send.
    pub fn record(&mut self, bytes: usize, result: &Result<(), ConnectorError>) {
        match result {
            Ok(()) => {
                self.messages_sent += 1;
                self.bytes_sent += bytes as u64;
            }
            Err(err) => {
                self.messages_failed += 1;
                self.last_error = Some(err.to_string());
            }
        }
    }
}

/// Topic layout for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    pub prefix: String,
    pub device: String,
}

impl TopicScheme {
    pub fn new(prefix: &str, device: &str) -> Self {
        Self { prefix: prefix.to_string(), device: device.to_string() }
    }

    /// Topic for something this device publishes.
    pub fn device_topic(&self, topic: &str) -> String {
        format!("{}/{}/{}", self.prefix, self.device, topic)
    }

    /// Topic another device reads its commands from.
    pub fn command_topic(&self, destination: &str) -> String {
        format!("{}/{}/command", self.prefix, destination)
    }

    /// Topic this device reads its commands from.
    pub fn inbound_topic(&self) -> String {
        self.command_topic(&self.device)
    }
}

/// [`RemotePublisher`] over any [`Connector`]
pub struct ConnectorPublisher<C> {
    connector: C,
    topics: TopicScheme,
}

impl<C: Connector> ConnectorPublisher<C> {
    pub fn new(connector: C, topics: TopicScheme) -> Self {
        Self { connector, topics }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    fn send(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.connector.is_connected() {
            return Err(PublishError::NotConnected);
        }
        self.connector.send(topic, payload.as_bytes()).map_err(|err| {
            log::warn!("send to {} failed: {}", topic, err);
            PublishError::from(err)
        })
    }
}

impl<C: Connector> RemotePublisher for ConnectorPublisher<C> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let topic = self.topics.device_topic(topic);
        self.send(&topic, payload)
    }

    fn publish_command(&mut self, destination: &str, envelope: &str) -> Result<(), PublishError> {
        let topic = self.topics.command_topic(destination);
        self.send(&topic, envelope)
    }

    fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        connected: bool,
        sent: Vec<(String, Vec<u8>)>,
        stats: ConnectionStats,
    }

    impl Connector for Recorder {
        fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), ConnectorError> {
            let result = if data.is_empty() {
                Err(ConnectorError::ProtocolError("empty payload".into()))
            } else {
                self.sent.push((topic.to_string(), data.to_vec()));
                Ok(())
            };
            self.stats.record(data.len(), &result);
            result
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn stats(&self) -> ConnectionStats {
            self.stats.clone()
        }
    }

    #[test]
    fn topics_follow_scheme() {
        let recorder = Recorder { connected: true, ..Default::default() };
        let mut publisher = ConnectorPublisher::new(recorder, TopicScheme::new("lb", "CLB-1"));
        publisher.publish("registered", "{}").unwrap();
        publisher.publish_command("CLB-2", "{\"x\":{}}").unwrap();

        let sent = &publisher.connector().sent;
        assert_eq!(sent[0].0, "lb/CLB-1/registered");
        assert_eq!(sent[1].0, "lb/CLB-2/command");
        assert_eq!(publisher.topics().inbound_topic(), "lb/CLB-1/command");
    }

    #[test]
    fn failures_map_to_publish_errors() {
        let mut offline = ConnectorPublisher::new(Recorder::default(), TopicScheme::new("lb", "d"));
        assert_eq!(offline.publish("t", "x"), Err(PublishError::NotConnected));

        let recorder = Recorder { connected: true, ..Default::default() };
        let mut publisher = ConnectorPublisher::new(recorder, TopicScheme::new("lb", "d"));
        assert!(matches!(publisher.publish("t", ""), Err(PublishError::Rejected(_))));

        let stats = publisher.connector().stats();
        assert_eq!(stats.messages_failed, 1);
        assert!(stats.last_error.is_some());
    }
}
