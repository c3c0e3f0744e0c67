//! Shared wall-clock domain
//!
//! Both earbuds translate their own monotonic clock into a wall-clock domain
//! that is common to the pair while the peer link is up. Quiet-mode
//! transitions are scheduled in this domain so that both sides can act on
//! the same instant independently.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Microseconds in a millisecond
pub const US_PER_MS: u32 = 1_000;

/// An instant in the shared wall-clock domain
///
/// Microsecond resolution, 32 bits, wrapping. Comparisons go through
/// [`WallClock::delta_since`] so a wrap between two nearby instants is harmless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallClock(u32);

impl WallClock {
    /// The "no instant pending" value
    pub const ZERO: Self = Self(0);

    /// Wrap a raw microsecond value
    #[must_use]
    pub const fn from_micros(us: u32) -> Self {
        Self(us)
    }

    /// Raw microsecond value
    #[must_use]
    pub const fn as_micros(self) -> u32 {
        self.0
    }

    /// Whether this is the zero instant
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Add a duration, wrapping at 32 bits
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn add(self, d: Duration) -> Self {
        Self(self.0.wrapping_add(d.as_micros() as u32))
    }

    /// Signed microseconds from `earlier` to `self`
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn delta_since(self, earlier: Self) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// Time remaining until `self` as seen from `now`, or `None` if already due
    #[must_use]
    pub fn until(self, now: Self) -> Option<Duration> {
        let delta = self.delta_since(now);
        u64::try_from(delta)
            .ok()
            .filter(|us| *us > 0)
            .map(Duration::from_micros)
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Converts local time into the shared wall-clock domain
pub trait ClockBridge: Send {
    /// Current wall-clock reading, or `None` if no valid peer link is
    /// available to anchor the domain
    fn wall_clock_now(&self) -> Option<WallClock>;
}

/// Bridge backed by the host's system time
///
/// Two processes on the same host share this domain, which is what the
/// simulator relies on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClockBridge;

impl ClockBridge for SystemClockBridge {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn wall_clock_now(&self) -> Option<WallClock> {
        let us = chrono::Utc::now().timestamp_micros();
        (us > 0).then(|| WallClock::from_micros(us as u32))
    }
}
