//! Events, channels and trigger descriptions
//!
//! A sensor fires an [`Event`], optionally narrowed to a set of
//! [`Channels`]. Listeners select what they want with a [`Trigger`], the pair
//! of an event and a channel set. The two halves are kept as separate types
//! so that matching stays exact:
//!
//! - the listener's event must equal the fired event
//! - the channel part is checked according to the fired [`ChannelFilter`]
//!
//! Sensors advertise the triggers they support through a static table of
//! [`EventBinder`]s, which is what operators pick from by name.

use core::fmt;

/// Something a sensor can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// A reading moved by more than its configured delta
    Change,
    /// A binary input became active
    Triggered,
    /// A binary input became inactive
    Cleared,
    /// A new clock second
    Second,
    /// A new clock minute
    Minute,
    /// A minute divisible by five
    FiveMinutes,
    /// A minute divisible by thirty
    HalfHour,
    /// A new clock hour
    Hour,
    /// Driver-specific event
    Custom(u8),
}

impl Event {
    pub const fn name(self) -> &'static str {
        match self {
            Event::Change => "change",
            Event::Triggered => "triggered",
            Event::Cleared => "cleared",
            Event::Second => "second",
            Event::Minute => "minute",
            Event::FiveMinutes => "fiveMinutes",
            Event::HalfHour => "halfHour",
            Event::Hour => "hour",
            Event::Custom(_) => "custom",
        }
    }

    /// Calendar-aligned events produced by the cadence evaluator.
    pub const fn is_calendar(self) -> bool {
        matches!(
            self,
            Event::Second | Event::Minute | Event::FiveMinutes | Event::HalfHour | Event::Hour
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Custom(code) => write!(f, "custom({})", code),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Event {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.name())
    }
}

/// Channel flags of a multiplexed sensor
///
/// The kernel does not know what a channel means; each sensor defines its
/// own named constants with [`Channels::bit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Channels(u8);

impl Channels {
    pub const NONE: Self = Self(0);

    /// Channel number `n` (0..8) as a single flag.
    pub const fn bit(n: u8) -> Self {
        Self(1 << n)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Number of channel flags set.
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Individual flags in ascending order.
    pub fn iter(self) -> impl Iterator<Item = Channels> {
        (0..8u8).map(Channels::bit).filter(move |c| self.intersects(*c))
    }
}

/// How a fired event narrows the listeners it reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFilter {
    /// Every listener for the event, whatever its channels
    All,
    /// Listeners configured for exactly this channel set
    Exact(Channels),
    /// Listeners sharing at least one channel with this set
    Any(Channels),
}

impl ChannelFilter {
    pub fn admits(self, configured: Channels) -> bool {
        match self {
            ChannelFilter::All => true,
            ChannelFilter::Exact(channels) => configured == channels,
            ChannelFilter::Any(channels) => configured.intersects(channels),
        }
    }
}

/// Event plus channel selector carried by a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub event: Event,
    pub channels: Channels,
}

impl Trigger {
    pub const fn new(event: Event, channels: Channels) -> Self {
        Self { event, channels }
    }

    /// Trigger on an event with no channel selection.
    pub const fn event(event: Event) -> Self {
        Self { event, channels: Channels::NONE }
    }

    /// Exact match rule used by dispatch.
    pub fn matches(&self, event: Event, filter: ChannelFilter) -> bool {
        self.event == event && filter.admits(self.channels)
    }
}

/// Named trigger a sensor supports
#[derive(Debug, Clone, Copy)]
pub struct EventBinder {
    pub name: &'static str,
    pub trigger: Trigger,
}

impl EventBinder {
    pub const fn new(name: &'static str, event: Event, channels: Channels) -> Self {
        Self { name, trigger: Trigger::new(event, channels) }
    }
}

/// Find a binder by name, ignoring case.
pub fn find_binder(binders: &'static [EventBinder], name: &str) -> Option<&'static EventBinder> {
    binders.iter().find(|b| b.name.eq_ignore_ascii_case(name))
}
