//! Entity status and boot modes
//!
//! Every process and sensor carries a [`Status`]. The lifecycle engine only
//! interprets it to decide which callbacks may run:
//!
//! ```text
//! Unstarted ──start──▶ Ok | NotFitted | NotConnected | Waiting(..)
//!                       │                                 ▲
//!                       └──────────update────────────────┘
//! any ──stop──▶ Off ──start──▶ ...
//! ```
//!
//! `NotFitted` and `NotConnected` are terminal for the session: `update` is
//! skipped and `start` is not retried until the entity is stopped and
//! started again (in practice, a restart).

use core::fmt;

/// Lifecycle status of a process or sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Registered but never started
    Unstarted,
    /// Running normally
    Ok,
    /// Stopped, or configured off
    Off,
    /// Hardware absent by configuration
    NotFitted,
    /// Hardware probe or read failed
    NotConnected,
    /// Waiting for a dependency, named by the payload
    Waiting(&'static str),
}

impl Status {
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    /// `start` may run from this status.
    pub const fn permits_start(self) -> bool {
        matches!(self, Status::Unstarted | Status::Off)
    }

    /// `update` may run from this status.
    pub const fn permits_update(self) -> bool {
        matches!(self, Status::Ok | Status::Waiting(_))
    }

    /// Short label used in listings.
    pub const fn label(self) -> &'static str {
        match self {
            Status::Unstarted => "unstarted",
            Status::Ok => "ok",
            Status::Off => "off",
            Status::NotFitted => "not fitted",
            Status::NotConnected => "not connected",
            Status::Waiting(_) => "waiting",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Waiting(on) => write!(f, "waiting for {}", on),
            other => f.write_str(other.label()),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Status::Waiting(on) => defmt::write!(fmt, "waiting for {}", on),
            other => defmt::write!(fmt, "{}", other.label()),
        }
    }
}

/// Operating mode the device booted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BootMode {
    /// Early boot, before the normal process set is active
    Boot,
    /// Normal operation
    Active,
    /// Configuration host with the device's own settings pages
    Config,
    /// Access-point mode for entering network credentials
    WifiConfig,
}

impl BootMode {
    /// Flag for this mode in a [`BootModes`] mask.
    pub const fn flag(self) -> BootModes {
        match self {
            BootMode::Boot => BootModes::BOOT,
            BootMode::Active => BootModes::ACTIVE,
            BootMode::Config => BootModes::CONFIG,
            BootMode::WifiConfig => BootModes::WIFI_CONFIG,
        }
    }
}

/// Set of boot modes an entity takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootModes(u8);

impl BootModes {
    pub const BOOT: Self = Self(1 << 0);
    pub const ACTIVE: Self = Self(1 << 1);
    pub const CONFIG: Self = Self(1 << 2);
    pub const WIFI_CONFIG: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b1111)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// True when this set includes `mode`.
    pub const fn includes(&self, mode: BootMode) -> bool {
        self.intersects(mode.flag())
    }
}

/// Restart flavour requested by an operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    /// Ordinary reboot into the active mode
    Cold,
    /// Reboot into the configuration host
    ConfigHost,
}
