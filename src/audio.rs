//! Audio subsystem collaborator
//!
//! The manager never touches DSP or ANC hardware directly. Everything goes
//! through [`AudioSubsystem`], whose fallible operations report failure by
//! returning `false` rather than erroring, so that the state machine decides
//! what a failure means.

use std::collections::HashMap;

use crate::anc::AncMode;
use crate::config::MicConfig;

/// Hardware ANC instance, hard-wired to a DAC channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AncInstance {
    /// Instance 0, left channel
    Left,
    /// Instance 1, right channel
    Right,
}

/// Filter path within an ANC instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GainPath {
    /// Feed-forward path A
    Ffa,
    /// Feed-forward path B
    Ffb,
    /// Feedback path
    Fb,
}

/// Which tuning session the tuning link is attached for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TuningKind {
    /// Static filter tuning, ANC hardware off
    Static,
    /// Adaptive tuning, ANC hardware running
    Adaptive,
}

/// Parameters used to start adaptive processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveParams {
    /// Earbud currently in the ear
    pub in_ear: bool,
    /// Path the adaptive operator controls
    pub control_path: Option<GainPath>,
    /// Mode to run in
    pub mode: AncMode,
}

/// Operations the manager needs from the audio chain and ANC hardware
pub trait AudioSubsystem: Send {
    /// Probe microphones and licensing, load the initial mode
    fn initialise(&mut self, mics: &MicConfig, mode: AncMode) -> bool;

    /// Turn ANC hardware on
    fn enable_hardware(&mut self) -> bool;

    /// Turn ANC hardware on with all filter path gains muted
    fn enable_hardware_muted(&mut self) -> bool;

    /// Turn ANC hardware off
    fn disable_hardware(&mut self) -> bool;

    /// Load the filter configuration of `mode`
    fn set_mode(&mut self, mode: AncMode) -> bool;

    /// Push the use-case identifier for `mode` to adaptive processing
    fn set_mode_identifier(&mut self, mode: AncMode);

    /// Swap adaptive processing to `mode` without a hardware mute
    fn apply_mode_change_live(&mut self, mode: AncMode);

    /// Ask adaptive processing to ramp its gains down
    fn enable_gentle_mute(&mut self);

    /// Switch adaptive quiet mode on
    fn enable_quiet_mode(&mut self);

    /// Switch adaptive quiet mode off
    fn disable_quiet_mode(&mut self);

    /// Fine gain of `path` on `instance`
    fn read_gain(&mut self, instance: AncInstance, path: GainPath) -> u8;

    /// Write the fine gain of `path` on `instance`
    fn set_gain(&mut self, instance: AncInstance, path: GainPath, gain: u8) -> bool;

    /// Current adaptive feed-forward gain
    fn feed_forward_gain(&mut self) -> u8;

    /// Whether adaptive processing is running
    fn is_adaptive_active(&self) -> bool;

    /// Start adaptive processing
    fn enable_adaptive(&mut self, params: AdaptiveParams) -> bool;

    /// Stop adaptive processing
    fn disable_adaptive(&mut self);

    /// Tell adaptive processing whether the earbud is in the ear
    fn update_in_ear(&mut self, in_ear: bool);

    /// Apply the configured filter path gains of the current mode
    fn apply_filter_path_gains(&mut self);

    /// Raise or restore the DSP clock around reconfiguration
    fn set_dsp_clock_boost(&mut self, boost: bool);

    /// Make the tuning link available to a host tool
    fn attach_tuning_link(&mut self, kind: TuningKind);

    /// Withdraw the tuning link
    fn detach_tuning_link(&mut self);

    /// Start a tuning session at the host's sample rate
    fn enter_tuning(&mut self, kind: TuningKind, sample_rate: u32);

    /// End a tuning session
    fn exit_tuning(&mut self, kind: TuningKind);
}

/// Host-side audio subsystem that only logs
///
/// Used by the daemon and the simulator; every operation succeeds.
#[derive(Debug, Default)]
pub struct SimulatedAudio {
    name: String,
    hardware_on: bool,
    adaptive_active: bool,
    quiet_mode: bool,
    mode: AncMode,
    gains: HashMap<(AncInstance, GainPath), u8>,
}

impl SimulatedAudio {
    /// Create a simulated subsystem labelled `name` in logs
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether the simulated hardware is on
    #[must_use]
    pub const fn is_hardware_on(&self) -> bool {
        self.hardware_on
    }

    /// Whether simulated quiet mode is on
    #[must_use]
    pub const fn is_quiet_mode_on(&self) -> bool {
        self.quiet_mode
    }

    const fn mode_fine_gain(mode: AncMode) -> u8 {
        // leakthrough modes get progressively more gain
        64_u8.saturating_add(mode.index().saturating_mul(16))
    }
}

impl AudioSubsystem for SimulatedAudio {
    fn initialise(&mut self, mics: &MicConfig, mode: AncMode) -> bool {
        tracing::info!(device = %self.name, ?mics, %mode, "audio: initialise");
        self.mode = mode;
        true
    }

    fn enable_hardware(&mut self) -> bool {
        tracing::info!(device = %self.name, "audio: hardware on");
        self.hardware_on = true;
        true
    }

    fn enable_hardware_muted(&mut self) -> bool {
        tracing::info!(device = %self.name, "audio: hardware on, path gains muted");
        for instance in [AncInstance::Left, AncInstance::Right] {
            self.gains.insert((instance, GainPath::Ffa), 0);
        }
        self.hardware_on = true;
        true
    }

    fn disable_hardware(&mut self) -> bool {
        tracing::info!(device = %self.name, "audio: hardware off");
        self.hardware_on = false;
        true
    }

    fn set_mode(&mut self, mode: AncMode) -> bool {
        tracing::info!(device = %self.name, %mode, "audio: set mode");
        self.mode = mode;
        self.gains.clear();
        true
    }

    fn set_mode_identifier(&mut self, mode: AncMode) {
        tracing::debug!(device = %self.name, %mode, "audio: mode identifier");
    }

    fn apply_mode_change_live(&mut self, mode: AncMode) {
        tracing::debug!(device = %self.name, %mode, "audio: live mode change");
    }

    fn enable_gentle_mute(&mut self) {
        tracing::debug!(device = %self.name, "audio: gentle mute");
    }

    fn enable_quiet_mode(&mut self) {
        tracing::info!(device = %self.name, "audio: quiet mode on");
        self.quiet_mode = true;
    }

    fn disable_quiet_mode(&mut self) {
        tracing::info!(device = %self.name, "audio: quiet mode off");
        self.quiet_mode = false;
    }

    fn read_gain(&mut self, instance: AncInstance, path: GainPath) -> u8 {
        self.gains
            .get(&(instance, path))
            .copied()
            .unwrap_or_else(|| Self::mode_fine_gain(self.mode))
    }

    fn set_gain(&mut self, instance: AncInstance, path: GainPath, gain: u8) -> bool {
        tracing::trace!(device = %self.name, ?instance, ?path, gain, "audio: set gain");
        self.gains.insert((instance, path), gain);
        true
    }

    fn feed_forward_gain(&mut self) -> u8 {
        if self.quiet_mode { 32 } else { 128 }
    }

    fn is_adaptive_active(&self) -> bool {
        self.adaptive_active
    }

    fn enable_adaptive(&mut self, params: AdaptiveParams) -> bool {
        tracing::info!(device = %self.name, ?params, "audio: adaptive processing on");
        self.adaptive_active = true;
        true
    }

    fn disable_adaptive(&mut self) {
        tracing::info!(device = %self.name, "audio: adaptive processing off");
        self.adaptive_active = false;
    }

    fn update_in_ear(&mut self, in_ear: bool) {
        tracing::debug!(device = %self.name, in_ear, "audio: in-ear status");
    }

    fn apply_filter_path_gains(&mut self) {
        tracing::debug!(device = %self.name, mode = %self.mode, "audio: filter path gains applied");
        self.gains.clear();
    }

    fn set_dsp_clock_boost(&mut self, boost: bool) {
        tracing::trace!(device = %self.name, boost, "audio: dsp clock");
    }

    fn attach_tuning_link(&mut self, kind: TuningKind) {
        tracing::info!(device = %self.name, ?kind, "audio: tuning link attached");
    }

    fn detach_tuning_link(&mut self) {
        tracing::info!(device = %self.name, "audio: tuning link detached");
    }

    fn enter_tuning(&mut self, kind: TuningKind, sample_rate: u32) {
        tracing::info!(device = %self.name, ?kind, sample_rate, "audio: tuning session started");
    }

    fn exit_tuning(&mut self, kind: TuningKind) {
        tracing::info!(device = %self.name, ?kind, "audio: tuning session ended");
        if kind == TuningKind::Adaptive {
            self.adaptive_active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gains_track_mode_until_written() {
        let mut audio = SimulatedAudio::new("test");
        assert!(audio.set_mode(AncMode::new(2)));
        assert_eq!(audio.read_gain(AncInstance::Left, GainPath::Ffa), 96);

        assert!(audio.set_gain(AncInstance::Left, GainPath::Ffa, 10));
        assert_eq!(audio.read_gain(AncInstance::Left, GainPath::Ffa), 10);

        audio.apply_filter_path_gains();
        assert_eq!(audio.read_gain(AncInstance::Left, GainPath::Ffa), 96);
    }

    #[test]
    fn quiet_mode_lowers_ff_gain() {
        let mut audio = SimulatedAudio::new("test");
        let loud = audio.feed_forward_gain();
        audio.enable_quiet_mode();
        assert!(audio.feed_forward_gain() < loud);
        assert!(audio.is_quiet_mode_on());
    }
}
