//! Listener dispatch
//!
//! ## Overview
//!
//! A listener ties one sensor trigger to one destination. It owns:
//!
//! - a [`ListenerConfig`]: destination, [`Trigger`] and a fixed-size
//!   [`ListenerBuffer`] reused for every delivery
//! - a [`ListenerTransport`] that receives `(destination, buffer)`
//!
//! Each sensor keeps a [`ListenerList`]. When the sensor fires an event the
//! list is walked in insertion order; every listener whose trigger matches
//! gets the sensor's reading formatted into its buffer and is then handed to
//! its transport. There is no priority and no coalescing: each matching
//! listener is invoked exactly once per fire.
//!
//! ## Transports
//!
//! The usual transport is [`QueueTransport`], which copies the buffer into a
//! shared [`DeliveryQueue`]. The kernel drains that queue after the sensor
//! pass and hands each [`Delivery`] to the named process. Any
//! `FnMut(&str, &ListenerBuffer)` closure is also a transport, which keeps
//! tests and one-off wiring short.
//!
//! ## Buffer layout
//!
//! For wire transfer a buffer packs to a flat byte array: the value as four
//! little-endian bytes followed by the message text, NUL padded.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Write;

use heapless::String as BoundedString;

use crate::constants::{MAX_DESTINATION_LENGTH, MAX_MESSAGE_LENGTH};
use crate::events::{ChannelFilter, Event, Trigger};
use crate::time::Timestamp;

/// Length of a packed listener buffer.
pub const PACKED_BUFFER_LENGTH: usize = 4 + MAX_MESSAGE_LENGTH;

/// Writes into a bounded string, stopping at the last character that fits.
struct Truncating<'a, const N: usize>(&'a mut BoundedString<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, text: &str) -> core::fmt::Result {
        for c in text.chars() {
            self.0.push(c).map_err(|_| core::fmt::Error)?;
        }
        Ok(())
    }
}

/// Output buffer: a packed number plus a formatted message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListenerBuffer {
    pub value: f32,
    pub message: BoundedString<MAX_MESSAGE_LENGTH>,
}

impl ListenerBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer preloaded with `message`, truncated to capacity.
    pub fn with_message(message: &str) -> Self {
        let mut buffer = Self::new();
        buffer.set_message(message);
        buffer
    }

    /// Replace the message, truncating at a character boundary.
    pub fn set_message(&mut self, message: &str) {
        self.message.clear();
        // Overflow only means the text was cut short
        let _ = Truncating(&mut self.message).write_str(message);
    }

    /// Replace the message with formatted text, truncating on overflow.
    pub fn format_message(&mut self, args: core::fmt::Arguments<'_>) {
        self.message.clear();
        let _ = Truncating(&mut self.message).write_fmt(args);
    }

    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Flat wire form: f32 little-endian then NUL-padded text.
    pub fn pack(&self) -> [u8; PACKED_BUFFER_LENGTH] {
        let mut bytes = [0u8; PACKED_BUFFER_LENGTH];
        bytes[..4].copy_from_slice(&self.value.to_le_bytes());
        let text = self.message.as_bytes();
        bytes[4..4 + text.len()].copy_from_slice(text);
        bytes
    }

    /// Inverse of [`pack`](Self::pack); `None` if the text is not UTF-8.
    pub fn unpack(bytes: &[u8; PACKED_BUFFER_LENGTH]) -> Option<Self> {
        let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let text = &bytes[4..];
        let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
        let message = core::str::from_utf8(&text[..end]).ok()?;
        let mut buffer = Self::with_message(message);
        buffer.value = value;
        Some(buffer)
    }
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub destination: BoundedString<MAX_DESTINATION_LENGTH>,
    pub trigger: Trigger,
    pub buffer: ListenerBuffer,
}

impl ListenerConfig {
    pub fn new(destination: &str, trigger: Trigger) -> Self {
        let mut bounded = BoundedString::new();
        let _ = Truncating(&mut bounded).write_str(destination);
        Self { destination: bounded, trigger, buffer: ListenerBuffer::new() }
    }

    /// Preload the buffer message, used by events that send fixed text.
    pub fn with_message(mut self, message: &str) -> Self {
        self.buffer.set_message(message);
        self
    }
}

/// Receiver of listener deliveries
pub trait ListenerTransport {
    fn receive_message(&mut self, destination: &str, buffer: &ListenerBuffer);

    /// Short description for listener listings.
    fn describe(&self) -> String {
        String::from("callback")
    }
}

impl<F> ListenerTransport for F
where
    F: FnMut(&str, &ListenerBuffer),
{
    fn receive_message(&mut self, destination: &str, buffer: &ListenerBuffer) {
        self(destination, buffer)
    }
}

/// A listener attached to one sensor
pub struct Listener {
    pub config: ListenerConfig,
    transport: Box<dyn ListenerTransport>,
    deliveries: u32,
    last_delivery: Option<Timestamp>,
}

impl Listener {
    pub fn new(config: ListenerConfig, transport: Box<dyn ListenerTransport>) -> Self {
        Self { config, transport, deliveries: 0, last_delivery: None }
    }

    pub fn deliveries(&self) -> u32 {
        self.deliveries
    }

    pub fn last_delivery(&self) -> Option<Timestamp> {
        self.last_delivery
    }

    pub fn transport_description(&self) -> String {
        self.transport.describe()
    }
}

impl core::fmt::Debug for Listener {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Listener")
            .field("config", &self.config)
            .field("transport", &self.transport.describe())
            .field("deliveries", &self.deliveries)
            .finish()
    }
}

/// Ordered listeners of one sensor
#[derive(Debug, Default)]
pub struct ListenerList {
    listeners: Vec<Listener>,
}

impl ListenerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; dispatch order is insertion order.
    pub fn add(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.iter()
    }

    /// Deliver `event` to every matching listener.
    ///
    /// `format` writes the sensor's current reading into a listener's buffer
    /// for that listener's trigger before the transport is called. Returns
    /// the number of listeners invoked.
    pub fn fire<F>(&mut self, event: Event, filter: ChannelFilter, now: Timestamp, mut format: F) -> usize
    where
        F: FnMut(&Trigger, &mut ListenerBuffer),
    {
        let mut invoked = 0;
        for listener in self.listeners.iter_mut() {
            if !listener.config.trigger.matches(event, filter) {
                continue;
            }
            format(&listener.config.trigger, &mut listener.config.buffer);
            listener
                .transport
                .receive_message(listener.config.destination.as_str(), &listener.config.buffer);
            listener.deliveries += 1;
            listener.last_delivery = Some(now);
            invoked += 1;
        }
        invoked
    }
}

/// A buffer on its way to a process
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Receiving process name
    pub process: String,
    pub destination: String,
    pub buffer: ListenerBuffer,
}

/// Shared queue of pending deliveries
pub type DeliveryQueue = Rc<RefCell<VecDeque<Delivery>>>;

/// Transport that queues deliveries for a named process
#[derive(Debug, Clone)]
pub struct QueueTransport {
    process: String,
    queue: DeliveryQueue,
}

impl QueueTransport {
    pub fn new(process: &str, queue: DeliveryQueue) -> Self {
        Self { process: process.to_string(), queue }
    }
}

impl ListenerTransport for QueueTransport {
    fn receive_message(&mut self, destination: &str, buffer: &ListenerBuffer) {
        self.queue.borrow_mut().push_back(Delivery {
            process: self.process.clone(),
            destination: destination.to_string(),
            buffer: buffer.clone(),
        });
    }

    fn describe(&self) -> String {
        self.process.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Channels;

    const TEMP: Channels = Channels::bit(0);
    const HUMID: Channels = Channels::bit(1);

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Box<dyn ListenerTransport> {
        let log = log.clone();
        Box::new(move |destination: &str, buffer: &ListenerBuffer| {
            log.borrow_mut().push(alloc::format!("{}:{}:{}", tag, destination, buffer.message()));
        })
    }

    #[test]
    fn exact_channel_dispatch_reaches_only_matching_listener() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ListenerList::new();
        list.add(Listener::new(
            ListenerConfig::new("temp", Trigger::new(Event::Change, TEMP)),
            recorder(&log, "L1"),
        ));
        list.add(Listener::new(
            ListenerConfig::new("humid", Trigger::new(Event::Change, HUMID)),
            recorder(&log, "L2"),
        ));

        let invoked = list.fire(Event::Change, ChannelFilter::Exact(TEMP), 5, |_, buffer| {
            buffer.set_message("21.5");
        });

        assert_eq!(invoked, 1);
        assert_eq!(*log.borrow(), ["L1:temp:21.5"]);
        assert_eq!(list.iter().next().unwrap().last_delivery(), Some(5));
    }

    #[test]
    fn dispatch_follows_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ListenerList::new();
        for tag in ["first", "second", "third"] {
            list.add(Listener::new(
                ListenerConfig::new(tag, Trigger::event(Event::Minute)),
                recorder(&log, tag),
            ));
        }

        assert_eq!(list.fire(Event::Minute, ChannelFilter::All, 0, |_, _| {}), 3);
        let order: Vec<_> = log.borrow().iter().map(|entry| entry.split(':').next().unwrap().to_string()).collect();
        assert_eq!(order, ["first", "second", "third"]);
        assert_eq!(list.fire(Event::Hour, ChannelFilter::All, 0, |_, _| {}), 0);
    }

    #[test]
    fn queue_transport_collects_deliveries() {
        let queue: DeliveryQueue = Rc::default();
        let mut list = ListenerList::new();
        list.add(Listener::new(
            ListenerConfig::new("lb/motion", Trigger::event(Event::Triggered)).with_message("motion"),
            Box::new(QueueTransport::new("mqtt", queue.clone())),
        ));

        list.fire(Event::Triggered, ChannelFilter::All, 0, |_, _| {});
        let delivery = queue.borrow_mut().pop_front().unwrap();
        assert_eq!(delivery.process, "mqtt");
        assert_eq!(delivery.destination, "lb/motion");
        assert_eq!(delivery.buffer.message(), "motion");
    }

    #[test]
    fn message_truncates_at_capacity() {
        let long: String = core::iter::repeat('x').take(MAX_MESSAGE_LENGTH + 10).collect();
        let buffer = ListenerBuffer::with_message(&long);
        assert_eq!(buffer.message().len(), MAX_MESSAGE_LENGTH);
    }

    #[test]
    fn formatted_message_keeps_what_fits() {
        let mut buffer = ListenerBuffer::with_message("stale");
        let digits: String = core::iter::repeat('9').take(MAX_MESSAGE_LENGTH).collect();
        buffer.format_message(format_args!("{{\"temp\":{}}}", digits));
        assert_eq!(buffer.message().len(), MAX_MESSAGE_LENGTH);
        assert!(buffer.message().starts_with("{\"temp\":999"));

        buffer.format_message(format_args!("{:.1}", 21.04f32));
        assert_eq!(buffer.message(), "21.0");
    }

    #[test]
    fn packed_form_keeps_value_and_text() {
        let mut buffer = ListenerBuffer::with_message("{\"temp\":21.5}");
        buffer.value = 0.575;
        let packed = buffer.pack();
        assert_eq!(&packed[..4], &0.575f32.to_le_bytes());
        assert_eq!(ListenerBuffer::unpack(&packed), Some(buffer));
    }
}
