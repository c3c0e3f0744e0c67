//! Quiet-mode record exchanged between peers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::WallClock;

/// Direction of a scheduled quiet-mode transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuietModeDirection {
    /// Switch quiet mode on
    Enable,
    /// Switch quiet mode off
    Disable,
}

impl fmt::Display for QuietModeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "enable"),
            Self::Disable => write!(f, "disable"),
        }
    }
}

/// Quiet-mode view of one earbud
///
/// Two instances live on each device: the local one, mutated only by the
/// synchroniser, and a mirror of the peer's, overwritten verbatim by each
/// inbound record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietModeRecord {
    /// Ambient silence currently observed
    pub detected: bool,

    /// Quiet mode currently active
    pub enabled: bool,

    /// Enable transition scheduled for `timestamp`
    pub enable_requested: bool,

    /// Disable transition scheduled for `timestamp`
    pub disable_requested: bool,

    /// Wall-clock instant of the scheduled transition, zero when none
    pub timestamp: WallClock,
}

impl QuietModeRecord {
    /// Whether either transition is in flight
    #[must_use]
    pub const fn has_request(&self) -> bool {
        self.enable_requested || self.disable_requested
    }

    /// The in-flight transition, enable taking precedence
    #[must_use]
    pub const fn pending(&self) -> Option<QuietModeDirection> {
        if self.enable_requested {
            Some(QuietModeDirection::Enable)
        } else if self.disable_requested {
            Some(QuietModeDirection::Disable)
        } else {
            None
        }
    }

    /// Whether a transition in `direction` is in flight
    #[must_use]
    pub const fn requested(&self, direction: QuietModeDirection) -> bool {
        match direction {
            QuietModeDirection::Enable => self.enable_requested,
            QuietModeDirection::Disable => self.disable_requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_zeroed() {
        let r = QuietModeRecord::default();
        assert!(!r.detected && !r.enabled && !r.has_request());
        assert!(r.timestamp.is_zero());
        assert_eq!(r.pending(), None);
    }

    #[test]
    fn pending_prefers_enable() {
        let r = QuietModeRecord {
            enable_requested: true,
            disable_requested: true,
            ..Default::default()
        };
        assert_eq!(r.pending(), Some(QuietModeDirection::Enable));
    }

    #[test]
    fn serializes_timestamp_as_plain_number() {
        let r = QuietModeRecord {
            detected: true,
            enable_requested: true,
            timestamp: WallClock::from_micros(1234),
            ..Default::default()
        };
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["timestamp"], 1234);
        let back: QuietModeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
