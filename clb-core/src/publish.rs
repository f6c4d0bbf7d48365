//! Remote-publish collaborator
//!
//! The kernel never talks to a network stack directly. Anything that must
//! leave the device (listener output routed through the MQTT process,
//! registration payloads, redirected command envelopes) goes through a
//! [`RemotePublisher`].

use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::errors::PublishError;

/// Outbound message transport
pub trait RemotePublisher {
    /// Publish `payload` on `topic`.
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError>;

    /// Send a command envelope to another device.
    ///
    /// Defaults to publishing on the destination name as topic.
    fn publish_command(&mut self, destination: &str, envelope: &str) -> Result<(), PublishError> {
        self.publish(destination, envelope)
    }

    /// True while the transport can accept messages.
    fn is_connected(&self) -> bool;
}

/// Publisher with no transport behind it
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl RemotePublisher for NullPublisher {
    fn publish(&mut self, _topic: &str, _payload: &str) -> Result<(), PublishError> {
        Err(PublishError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// A message captured by [`MemoryPublisher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    /// Sent through `publish_command`
    pub command: bool,
}

/// Publisher that records messages in memory
///
/// Clones share the record and the link flag, so tests can hold one clone
/// while the kernel owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    sent: Rc<RefCell<Vec<Published>>>,
    connected: Rc<Cell<bool>>,
}

impl MemoryPublisher {
    /// A publisher whose link is up.
    pub fn connected() -> Self {
        let publisher = Self::default();
        publisher.connected.set(true);
        publisher
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    pub fn sent(&self) -> Vec<Published> {
        self.sent.borrow().clone()
    }

    /// Remove and return everything captured so far.
    pub fn take(&self) -> Vec<Published> {
        core::mem::take(&mut *self.sent.borrow_mut())
    }

    fn record(&self, topic: &str, payload: &str, command: bool) -> Result<(), PublishError> {
        if !self.connected.get() {
            return Err(PublishError::NotConnected);
        }
        self.sent.borrow_mut().push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            command,
        });
        Ok(())
    }
}

impl RemotePublisher for MemoryPublisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.record(topic, payload, false)
    }

    fn publish_command(&mut self, destination: &str, envelope: &str) -> Result<(), PublishError> {
        self.record(destination, envelope, true)
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_publisher_requires_link() {
        let handle = MemoryPublisher::default();
        let mut publisher = handle.clone();
        assert_eq!(publisher.publish("t", "p"), Err(PublishError::NotConnected));

        handle.set_connected(true);
        publisher.publish("t", "p").unwrap();
        publisher.publish_command("other", "{}").unwrap();

        let sent = handle.take();
        assert_eq!(sent.len(), 2);
        assert!(!sent[0].command);
        assert!(sent[1].command);
        assert!(handle.sent().is_empty());
    }
}
