//! Events delivered to the manager
//!
//! Every stimulus, whether a user command, a timer expiry, a physical-state
//! change or a message from the peer, enters through one [`Event`] and one
//! dispatch point.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::anc::AncMode;
use crate::quiet_mode::{QuietModeDirection, QuietModeRecord};
use crate::timer::TimerKind;

/// Which earbud a physical-state change was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// This earbud
    Local,
    /// The peer earbud
    Remote,
}

/// Physical placement of an earbud
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhyState {
    /// In the ear
    InEar,
    /// Out of the ear, moving
    #[default]
    OutOfEar,
    /// Out of the ear, at rest
    OutOfEarAtRest,
    /// In the charging case
    InCase,
}

/// ANC state reported by the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAncState {
    /// Peer has ANC enabled
    pub enabled: bool,
    /// Peer's mode
    pub mode: AncMode,
    /// Peer's leakthrough gain
    pub leakthrough_gain: u8,
}

/// Input to the ANC manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Read configuration and probe the hardware
    Initialise,
    /// Device powered on
    PowerOn,
    /// Device powering off
    PowerOff,

    /// User enable
    Enable,
    /// User disable
    Disable,
    /// User mode selection
    SetMode(AncMode),
    /// Cycle to the next mode
    SetNextMode,
    /// Set leakthrough gain for the current mode
    SetLeakthroughGain(u8),
    /// Enter static tuning
    EnterTuning,
    /// Leave static tuning
    ExitTuning,
    /// Enter adaptive tuning
    EnterAdaptiveTuning,
    /// Leave adaptive tuning
    ExitAdaptiveTuning,
    /// Voice call started
    ImplicitEnable,
    /// Voice call ended
    ImplicitDisable,

    /// Host tool attached to the tuning link
    TuningLinkAttached {
        /// Sample rate negotiated by the host
        sample_rate: u32,
    },
    /// Host tool detached
    TuningLinkDetached,

    /// An earbud changed physical state
    PhyStateChanged {
        /// Which earbud
        source: EventSource,
        /// New placement
        state: PhyState,
    },

    /// Adaptive processing reported ambient silence
    QuietModeDetected,
    /// Adaptive processing reported the silence has ended
    QuietModeCleared,
    /// The agreed quiet-mode instant arrived
    QuietModeFire(QuietModeDirection),

    /// Peer's quiet-mode record
    PeerQuietMode(QuietModeRecord),
    /// Peer's ANC state
    PeerAncState(PeerAncState),
    /// Peer's adaptive feed-forward gain
    PeerFeedForwardGain(u8),
    /// Peer link went down
    PeerLinkLost,

    /// A timer expired
    TimerExpired(TimerKind),
}

impl Event {
    /// Short name for logs and rejection errors
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Initialise => "initialise",
            Self::PowerOn => "power-on",
            Self::PowerOff => "power-off",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::SetMode(_) => "set-mode",
            Self::SetNextMode => "set-next-mode",
            Self::SetLeakthroughGain(_) => "set-leakthrough-gain",
            Self::EnterTuning => "enter-tuning",
            Self::ExitTuning => "exit-tuning",
            Self::EnterAdaptiveTuning => "enter-adaptive-tuning",
            Self::ExitAdaptiveTuning => "exit-adaptive-tuning",
            Self::ImplicitEnable => "implicit-enable",
            Self::ImplicitDisable => "implicit-disable",
            Self::TuningLinkAttached { .. } => "tuning-link-attached",
            Self::TuningLinkDetached => "tuning-link-detached",
            Self::PhyStateChanged { .. } => "phy-state-changed",
            Self::QuietModeDetected => "quiet-mode-detected",
            Self::QuietModeCleared => "quiet-mode-cleared",
            Self::QuietModeFire(_) => "quiet-mode-fire",
            Self::PeerQuietMode(_) => "peer-quiet-mode",
            Self::PeerAncState(_) => "peer-anc-state",
            Self::PeerFeedForwardGain(_) => "peer-ff-gain",
            Self::PeerLinkLost => "peer-link-lost",
            Self::TimerExpired(_) => "timer-expired",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error parsing a console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventError(String);

impl fmt::Display for ParseEventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised command: {}", self.0)
    }
}

impl std::error::Error for ParseEventError {}

impl FromStr for Event {
    type Err = ParseEventError;

    /// Parse a console command such as `mode 3` or `call start`
    ///
    /// Mode numbers are 1-based, matching what users see.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEventError(s.trim().to_string());
        let words: Vec<&str> = s.split_whitespace().collect();

        let event = match words.as_slice() {
            ["enable" | "on"] => Self::Enable,
            ["disable" | "off"] => Self::Disable,
            ["next"] => Self::SetNextMode,
            ["mode", n] => {
                let n: u8 = n.parse().map_err(|_| err())?;
                Self::SetMode(AncMode::from_number(n).ok_or_else(err)?)
            }
            ["gain", g] => Self::SetLeakthroughGain(g.parse().map_err(|_| err())?),
            ["call", "start"] => Self::ImplicitEnable,
            ["call", "end" | "stop"] => Self::ImplicitDisable,
            ["quiet", "on"] => Self::QuietModeDetected,
            ["quiet", "off"] => Self::QuietModeCleared,
            ["tune"] => Self::EnterTuning,
            ["untune"] => Self::ExitTuning,
            ["tune", "adaptive"] => Self::EnterAdaptiveTuning,
            ["untune", "adaptive"] => Self::ExitAdaptiveTuning,
            ["usb", "attach", rate] => Self::TuningLinkAttached {
                sample_rate: rate.parse().map_err(|_| err())?,
            },
            ["usb", "detach"] => Self::TuningLinkDetached,
            ["power", "on"] => Self::PowerOn,
            ["power", "off"] => Self::PowerOff,
            ["ear", "in"] => Self::PhyStateChanged {
                source: EventSource::Local,
                state: PhyState::InEar,
            },
            ["ear", "out"] => Self::PhyStateChanged {
                source: EventSource::Local,
                state: PhyState::OutOfEar,
            },
            ["case"] => Self::PhyStateChanged {
                source: EventSource::Local,
                state: PhyState::InCase,
            },
            ["peer", "case"] => Self::PhyStateChanged {
                source: EventSource::Remote,
                state: PhyState::InCase,
            },
            ["peer", "lost"] => Self::PeerLinkLost,
            _ => return Err(err()),
        };
        Ok(event)
    }
}
