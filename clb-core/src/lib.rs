//! Orchestration kernel for Connected Little Boxes
//!
//! Every process and sensor on a box runs on the same small kernel:
//! a cooperative lifecycle scheduler, listener-based event dispatch, typed
//! settings with persistence, and self-describing commands that run either
//! locally or on another device.
//!
//! Key constraints:
//! - Single thread of control, one pass per tick
//! - `no_std` + `alloc` capable for the device build
//! - Fixed-size listener buffers, allocated once per listener
//!
//! ```no_run
//! use clb_core::kernel::{Kernel, KernelConfig};
//! use clb_core::processes::{ConsoleProcess, MessagesProcess};
//! use clb_core::hal::ScriptedInput;
//!
//! let mut kernel = Kernel::builder(KernelConfig::default()).build();
//! kernel.register_process(Box::new(MessagesProcess::new())).unwrap();
//! kernel.register_process(Box::new(ConsoleProcess::new(ScriptedInput::new()))).unwrap();
//! kernel.setup();
//!
//! loop {
//!     kernel.tick();
//!     if kernel.take_restart_request().is_some() {
//!         break;
//!     }
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! log_info {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

pub mod constants;
pub mod errors;
pub mod time;
pub mod field;
pub mod settings;
pub mod status;
pub mod events;
pub mod reading;
pub mod cadence;
pub mod listener;
pub mod publish;
pub mod output;
pub mod entity;
pub mod commands;
pub mod registry;
pub mod kernel;
pub mod console;
pub mod hal;
pub mod processes;
pub mod sensors;

// Public API
pub use commands::{Command, CommandBuffer, CommandCollection, CommandItem, InboundCommand};
pub use entity::{DeviceInfo, Entity, Process, ProcessContext, Request, Sensor, SensorContext, TickInfo};
pub use errors::{
    CommandError, CommandResult, FieldError, PublishError, RegistryError, SettingsError, SettingsResult,
    StoreError,
};
pub use events::{ChannelFilter, Channels, Event, EventBinder, Trigger};
pub use field::{FieldKind, FieldValue};
pub use kernel::{Kernel, KernelBuilder, KernelConfig};
pub use listener::{ListenerBuffer, ListenerConfig, ListenerTransport};
pub use publish::RemotePublisher;
pub use reading::Reading;
pub use registry::{ProcessHandle, Registry, SensorHandle, SettingsSetup};
pub use settings::{SettingsBlock, SettingsStore};
pub use status::{BootMode, BootModes, RestartMode, Status};
pub use time::{ClockReading, TimeSource, Timestamp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
