//! Leakthrough and feed-forward gain handling

use crate::audio::{AncInstance, GainPath};
use crate::config::{AncPath, EarSide};
use crate::notify::Notification;
use crate::timer::TimerKind;

use super::{AncManager, AncMode, DEFAULT_SECONDARY_FF_GAIN};

/// Fine gain above which the ramp steps by two
const RAMP_COARSE_THRESHOLD: u8 = 12;

/// Gain steps written when ramping a static filter path down to mute
///
/// Steps by two while above 12, then by one, always ending at zero.
#[must_use]
pub fn ramp_down_steps(fine_gain: u8) -> Vec<u8> {
    let mut steps = Vec::new();
    let mut gain = fine_gain;

    while gain > RAMP_COARSE_THRESHOLD {
        steps.push(gain);
        gain -= 2;
    }
    gain = fine_gain.min(RAMP_COARSE_THRESHOLD);

    while gain > 0 {
        steps.push(gain);
        gain -= 1;
    }
    steps.push(0);
    steps
}

/// Instances and path a leakthrough gain is written to for a layout
const fn leakthrough_targets(path: AncPath) -> &'static [(AncInstance, GainPath)] {
    match path {
        AncPath::Hybrid => &[
            (AncInstance::Left, GainPath::Ffb),
            (AncInstance::Right, GainPath::Ffb),
        ],
        AncPath::HybridLeftOnly => &[(AncInstance::Left, GainPath::Ffb)],
        AncPath::FeedForward => &[
            (AncInstance::Left, GainPath::Ffa),
            (AncInstance::Right, GainPath::Ffa),
        ],
        AncPath::FeedForwardLeftOnly => &[(AncInstance::Left, GainPath::Ffa)],
        _ => &[],
    }
}

impl AncManager {
    /// Leakthrough gain only exists outside the adaptive mode
    fn leakthrough_applies(&self) -> bool {
        self.state.current_mode != AncMode::ADAPTIVE
    }

    /// Re-read the leakthrough gain of the mode just loaded
    pub(super) fn refresh_leakthrough_gain(&mut self) {
        let Some(path) = self.config.path.control_path() else {
            return;
        };
        let gain = self.io.audio.read_gain(AncInstance::Left, path);
        self.store_leakthrough_gain(gain);
    }

    fn store_leakthrough_gain(&mut self, gain: u8) {
        if self.leakthrough_applies() {
            self.state.leakthrough_gain = gain;
        }
    }

    fn write_leakthrough_gain(&mut self) {
        if !self.leakthrough_applies() {
            return;
        }

        let targets = leakthrough_targets(self.config.path);
        if targets.is_empty() {
            tracing::warn!(path = ?self.config.path, "leakthrough gain cannot be set for this path layout");
            return;
        }

        let gain = self.state.leakthrough_gain;
        for &(instance, path) in targets {
            if !self.io.audio.set_gain(instance, path, gain) {
                tracing::warn!(?instance, ?path, gain, "failed to write leakthrough gain");
            }
        }
    }

    pub(super) fn notify_leakthrough_gain(&self) {
        if self.leakthrough_applies() {
            self.notify(Notification::LeakthroughGainChanged {
                gain: self.state.leakthrough_gain,
            });
        }
    }

    /// Client-requested leakthrough gain
    pub(super) fn set_leakthrough_gain(&mut self, gain: u8) {
        self.store_leakthrough_gain(gain);
        self.write_leakthrough_gain();
        self.notify_leakthrough_gain();
    }

    /// Adopt the peer's leakthrough gain if it differs
    pub(super) fn sync_leakthrough_gain(&mut self, gain: u8) {
        if gain != self.state.leakthrough_gain {
            self.set_leakthrough_gain(gain);
        }
    }

    /// Ramp the feed-forward fine gain of each enabled channel down to mute
    pub(super) fn ramp_down_filter_path(&mut self) {
        let path = self.config.path;
        let instances = [
            (AncInstance::Left, path.uses_left()),
            (AncInstance::Right, path.uses_right()),
        ];

        for (instance, enabled) in instances {
            if !enabled {
                continue;
            }
            let fine_gain = self.io.audio.read_gain(instance, GainPath::Ffa);
            for step in ramp_down_steps(fine_gain) {
                self.io.audio.set_gain(instance, GainPath::Ffa, step);
            }
        }
        tracing::debug!("filter path ramped down");
    }

    pub(super) fn start_ff_gain_timer(&mut self) {
        self.io
            .timer
            .arm(TimerKind::FeedForwardGainPoll, self.config.timing.ff_gain_poll);
    }

    pub(super) fn stop_ff_gain_timer(&mut self) {
        self.io.timer.cancel(TimerKind::FeedForwardGainPoll);
    }

    /// Periodic read of the adaptive feed-forward gain
    pub(super) fn on_ff_gain_poll(&mut self) {
        if self.state.current_mode != AncMode::ADAPTIVE {
            return;
        }

        let gain = self.io.audio.feed_forward_gain();
        self.state.feed_forward_gain = gain;
        self.start_ff_gain_timer();
        self.notify(Notification::FeedForwardGain { gain });

        // no peer reports arrive while it is in the case
        if self.state.peer_in_case {
            self.notify_both_ff_gains(DEFAULT_SECONDARY_FF_GAIN);
        }
    }

    /// Report both earbuds' feed-forward gains, ordered by ear
    pub(super) fn notify_both_ff_gains(&self, secondary: u8) {
        let primary = self.state.feed_forward_gain;
        let (left, right) = match self.config.side {
            EarSide::Left => (primary, secondary),
            EarSide::Right => (secondary, primary),
        };
        self.notify(Notification::FeedForwardGains { left, right });
    }

    /// Tell clients when adaptive ANC starts or stops
    ///
    /// Adaptive ANC is running when enabled in the adaptive mode; only
    /// transitions in or out of that combination are reported.
    pub(super) fn notify_adaptive_state_change(&mut self, prev_enabled: bool, prev_mode: AncMode) {
        let enabled = self.state.actual_enabled;
        let mode = self.state.current_mode;

        let enable_changed = prev_enabled != enabled && mode == AncMode::ADAPTIVE;
        let mode_changed = prev_mode != mode
            && (prev_mode == AncMode::ADAPTIVE || mode == AncMode::ADAPTIVE);
        if !enable_changed && !mode_changed {
            return;
        }

        let adaptive = enabled && mode == AncMode::ADAPTIVE;
        self.notify(Notification::AdaptiveStateChanged { enabled: adaptive });

        if adaptive {
            self.start_ff_gain_timer();
        } else {
            self.stop_ff_gain_timer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_steps_coarse_then_fine() {
        let steps = ramp_down_steps(16);
        assert_eq!(&steps[..3], &[16, 14, 12]);
        assert_eq!(steps[3], 11);
        assert_eq!(steps.last(), Some(&0));
        assert_eq!(steps.len(), 2 + 12 + 1);
    }

    #[test]
    fn ramp_odd_gain_rejoins_at_threshold() {
        assert_eq!(&ramp_down_steps(15)[..3], &[15, 13, 12]);
    }

    #[test]
    fn ramp_small_gains() {
        assert_eq!(ramp_down_steps(3), vec![3, 2, 1, 0]);
        assert_eq!(ramp_down_steps(0), vec![0]);
        assert_eq!(ramp_down_steps(12).len(), 13);
    }

    #[test]
    fn leakthrough_written_per_layout() {
        assert_eq!(leakthrough_targets(AncPath::Hybrid).len(), 2);
        assert_eq!(
            leakthrough_targets(AncPath::FeedForwardLeftOnly),
            &[(AncInstance::Left, GainPath::Ffa)]
        );
        assert!(leakthrough_targets(AncPath::FeedBack).is_empty());
    }
}
