//! Runtime state owned by the manager

use serde::Serialize;

use super::{AncMode, AncState};
use crate::event::PhyState;

/// Everything the state machine tracks between events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AncRuntimeState {
    /// Lifecycle state
    pub state: AncState,
    /// Device powered
    pub power_on: bool,

    /// ANC requested on (persisted at power-off)
    pub requested_enabled: bool,
    /// Last confirmed hardware state
    pub actual_enabled: bool,

    /// Mode applied to the hardware
    pub current_mode: AncMode,
    /// Mode to apply next
    pub requested_mode: AncMode,
    /// Mode to restore when a call override ends
    pub previous_mode: AncMode,
    /// Number of configured modes
    pub num_modes: u8,

    /// Leakthrough gain of the current mode
    pub leakthrough_gain: u8,
    /// Last adaptive feed-forward gain read
    pub feed_forward_gain: u8,

    /// User enabled ANC during a call override
    pub user_initiated_enable: bool,
    /// User changed mode during a call override
    pub user_initiated_mode_switch: bool,
    /// ANC was force-enabled for a call
    pub implicit_enable_active: bool,
    /// Mode was force-switched for a call
    pub mode_override_active: bool,

    /// Hardware reconfiguration in progress
    pub dsp_clock_boost: bool,
    /// Peer earbud is in its case
    pub peer_in_case: bool,
    /// Local physical placement
    pub phy_state: PhyState,
    /// Sample rate of the attached tuning host
    pub tuning_sample_rate: Option<u32>,
}

impl AncRuntimeState {
    /// Clear the call-override user flags
    pub(super) const fn reset_user_flags(&mut self) {
        self.user_initiated_enable = false;
        self.user_initiated_mode_switch = false;
    }
}
