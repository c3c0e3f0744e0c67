//! Hardware sequencing, state transitions and session persistence

use crate::audio::AdaptiveParams;
use crate::event::PhyState;
use crate::notify::Notification;
use crate::persist::SessionData;
use crate::timer::TimerKind;
use crate::{Error, Result};

use super::{AncManager, AncMode, AncState};

impl AncManager {
    /// Bring the hardware to `enable` in `new_mode`
    ///
    /// Mode is applied before the enable state. The DSP clock is boosted for
    /// the duration of the reconfiguration.
    pub(super) fn update_lib_state(&mut self, enable: bool, new_mode: AncMode) -> Result<()> {
        self.state.dsp_clock_boost = true;
        self.io.audio.set_dsp_clock_boost(true);

        let prev_mode = self.state.current_mode;
        let prev_enabled = self.state.actual_enabled;
        let mut result = Ok(());

        if new_mode != self.state.current_mode {
            if let Err(e) = self.apply_mode(new_mode) {
                result = Err(e);
            }
        }

        if self.state.actual_enabled != enable {
            if !enable {
                self.disable_adaptive_anc();
            }

            if self.drive_hardware(enable) {
                self.state.actual_enabled = enable;
                if enable {
                    self.start_adaptive_anc_timer();
                }
                self.notify(Notification::StateChanged { enabled: enable });
            } else {
                tracing::warn!(enable, "ANC hardware did not change state");
                result = result.and(Err(Error::Hardware(format!(
                    "failed to {} ANC hardware",
                    if enable { "enable" } else { "disable" }
                ))));
            }
        }

        if self.config.adaptive {
            self.notify_adaptive_state_change(prev_enabled, prev_mode);
        }

        self.state.dsp_clock_boost = false;
        self.io.audio.set_dsp_clock_boost(false);
        result
    }

    fn apply_mode(&mut self, new_mode: AncMode) -> Result<()> {
        let adaptive_active = self.io.audio.is_adaptive_active();
        if adaptive_active {
            self.io.audio.set_mode_identifier(new_mode);
        }

        let in_range = new_mode.index() < self.state.num_modes;
        if !in_range || !self.load_mode(new_mode) {
            // keep requested and current in step
            self.state.requested_mode = self.state.current_mode;
            if adaptive_active {
                self.io.audio.set_mode_identifier(self.state.current_mode);
            }
            tracing::warn!(mode = %new_mode, "ANC mode change failed");
            return Err(if in_range {
                Error::Hardware(format!("failed to load {new_mode}"))
            } else {
                Error::ModeOutOfRange {
                    mode: new_mode,
                    num_modes: self.state.num_modes,
                }
            });
        }

        self.state.current_mode = new_mode;
        if self.state.actual_enabled && self.config.adaptive {
            self.io.audio.apply_mode_change_live(new_mode);
        }
        self.notify(Notification::ModeChanged { mode: new_mode });

        self.refresh_leakthrough_gain();
        self.notify_leakthrough_gain();
        Ok(())
    }

    fn load_mode(&mut self, mode: AncMode) -> bool {
        if !self.io.audio.is_adaptive_active() {
            // the new filter set brings its own path gains
            self.io.timer.cancel(TimerKind::PathGainSettle);
        }
        self.io.audio.set_mode(mode)
    }

    fn drive_hardware(&mut self, enable: bool) -> bool {
        if !enable {
            self.io.timer.cancel(TimerKind::PathGainSettle);
            if !self.config.adaptive {
                self.ramp_down_filter_path();
            }
            return self.io.audio.disable_hardware();
        }

        if self.config.adaptive {
            return self.io.audio.enable_hardware();
        }

        // static filters start muted and are ungated once settled
        let ok = self.io.audio.enable_hardware_muted();
        if ok {
            self.io
                .timer
                .arm(TimerKind::PathGainSettle, self.config.timing.path_gain_settle);
        }
        ok
    }

    /// Apply the pending mode after a gentle mute
    pub(super) fn update_anc_mode(&mut self) -> Result<()> {
        self.update_lib_state(self.state.requested_enabled, self.state.requested_mode)
    }

    /// Turn ANC off and move to `next`
    ///
    /// A power-off always completes even if the hardware does not confirm.
    /// Any other disable the hardware refuses leaves the machine `Enabled`
    /// and still requesting ANC on.
    pub(super) fn disable_anc(&mut self, next: AncState) -> Result<()> {
        let result = self.update_lib_state(false, self.state.requested_mode);

        if next == AncState::PowerOff {
            if self.state.actual_enabled {
                tracing::warn!("hardware did not confirm disable, powering off anyway");
                self.state.actual_enabled = false;
            }
            self.change_state(next);
        } else if self.state.actual_enabled {
            self.state.requested_enabled = true;
        } else {
            self.change_state(next);
        }

        self.state.reset_user_flags();
        result
    }

    pub(super) fn change_state(&mut self, new: AncState) {
        let old = self.state.state;

        if new == AncState::PowerOff && old != AncState::Uninitialised {
            self.stop_settle_timers();
            self.io.timer.cancel(TimerKind::PathGainSettle);
            self.persist_session();
        }

        tracing::info!(from = %old, to = %new, "ANC state change");
        self.state.state = new;
    }

    /// Cancel the adaptive settle and gentle-mute timers
    pub(super) fn stop_settle_timers(&mut self) {
        self.io.timer.cancel(TimerKind::ConfigSettle);
        self.io.timer.cancel(TimerKind::GentleMuteDisable);
        self.io.timer.cancel(TimerKind::GentleMuteModeUpdate);
    }

    fn persist_session(&mut self) {
        let persist = &self.config.persist;
        if !persist.enabled && !persist.mode {
            return;
        }

        let mut data = match self.io.store.load() {
            Ok(existing) => existing.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session data before saving");
                SessionData::default()
            }
        };
        if persist.enabled {
            data.enabled = self.state.requested_enabled;
        }
        if persist.mode {
            data.mode = self.state.requested_mode;
        }

        match self.io.store.save(&data) {
            Ok(()) => tracing::debug!(enabled = data.enabled, mode = %data.mode, "session data saved"),
            Err(e) => tracing::warn!(error = %e, "failed to save session data"),
        }
    }

    fn start_adaptive_anc_timer(&mut self) {
        if self.config.adaptive && !self.io.audio.is_adaptive_active() {
            self.io
                .timer
                .arm(TimerKind::ConfigSettle, self.config.timing.config_settle);
        }
    }

    fn disable_adaptive_anc(&mut self) {
        self.io.timer.cancel(TimerKind::ConfigSettle);
        if self.io.audio.is_adaptive_active() {
            self.io.audio.disable_adaptive();
        }
    }

    /// Start adaptive processing once the configuration has settled
    pub(super) fn enable_adaptive_anc(&mut self) {
        if !self.state.actual_enabled
            || self.state.state != AncState::Enabled
            || self.io.audio.is_adaptive_active()
        {
            return;
        }

        let params = AdaptiveParams {
            in_ear: self.state.phy_state == PhyState::InEar,
            control_path: self.config.path.control_path(),
            mode: self.state.current_mode,
        };
        if !self.io.audio.enable_adaptive(params) {
            tracing::warn!(mode = %params.mode, "adaptive processing failed to start");
        }
    }
}
