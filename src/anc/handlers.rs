//! Event routing and per-state handlers

use crate::audio::TuningKind;
use crate::event::Event;
use crate::timer::TimerKind;
use crate::{Error, Result};

use super::{AncManager, AncMode, AncState, new_synchronizer};

impl AncManager {
    /// Route one event
    ///
    /// Peer, physical-state and gain-poll input is handled the same in every
    /// state; everything else goes to the current state's handler.
    pub(super) fn handle(&mut self, event: Event) -> Result<()> {
        tracing::debug!(state = %self.state.state, event = event.name(), "handling event");

        let result = match event {
            Event::PeerQuietMode(record) => {
                self.on_peer_quiet_mode(record);
                Ok(())
            }
            Event::PeerAncState(peer) => {
                self.on_peer_anc_state(peer);
                Ok(())
            }
            Event::PeerFeedForwardGain(gain) => {
                self.notify_both_ff_gains(gain);
                Ok(())
            }
            Event::PeerLinkLost => {
                self.on_peer_link_lost();
                Ok(())
            }
            Event::PhyStateChanged { source, state } => {
                self.on_phy_state(source, state);
                Ok(())
            }
            Event::TimerExpired(TimerKind::FeedForwardGainPoll) => {
                self.on_ff_gain_poll();
                Ok(())
            }
            Event::TimerExpired(TimerKind::QuietModeFire(direction)) => {
                self.handle_in_state(Event::QuietModeFire(direction))
            }
            Event::Enable => {
                let result = self.handle_in_state(event);
                if result.is_ok() {
                    self.state.user_initiated_enable = true;
                }
                result
            }
            Event::SetMode(mode) => self.user_set_mode(mode),
            Event::SetNextMode => {
                let next = self.state.current_mode.next(self.state.num_modes);
                self.user_set_mode(next)
            }
            _ => self.handle_in_state(event),
        };

        if let Err(e) = &result {
            if e.is_rejection() {
                tracing::debug!(error = %e, "event dropped");
            }
        }
        result
    }

    /// Mode change requested by a client
    pub(super) fn user_set_mode(&mut self, mode: AncMode) -> Result<()> {
        self.internal_set_mode(mode)?;
        self.state.user_initiated_mode_switch = true;
        Ok(())
    }

    /// Mode change without marking user intent
    pub(super) fn internal_set_mode(&mut self, mode: AncMode) -> Result<()> {
        self.handle_in_state(Event::SetMode(mode))?;
        self.reset_quiet_mode();
        Ok(())
    }

    pub(super) fn handle_in_state(&mut self, event: Event) -> Result<()> {
        match self.state.state {
            AncState::Uninitialised => self.handle_uninitialised(event),
            AncState::PowerOff => self.handle_power_off(event),
            AncState::Disabled => self.handle_disabled(event),
            AncState::Enabled => self.handle_enabled(event),
            AncState::TuningActive => self.handle_tuning(TuningKind::Static, event),
            AncState::AdaptiveTuningActive => self.handle_tuning(TuningKind::Adaptive, event),
        }
    }

    fn handle_uninitialised(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Initialise => self.configure_and_init(),
            _ => Err(self.rejected(event)),
        }
    }

    fn handle_power_off(&mut self, event: Event) -> Result<()> {
        debug_assert!(!self.state.actual_enabled, "ANC enabled while powered off");

        match event {
            Event::PowerOn => {
                self.state.power_on = true;

                if self.state.requested_enabled {
                    // a failure here is retried on the next enable
                    if let Err(e) = self.update_lib_state(true, self.state.requested_mode) {
                        tracing::warn!(error = %e, "could not restore ANC at power-on");
                    }
                }

                let next = if self.state.actual_enabled {
                    AncState::Enabled
                } else {
                    AncState::Disabled
                };
                self.change_state(next);
                Ok(())
            }
            _ => Err(self.rejected(event)),
        }
    }

    fn handle_disabled(&mut self, event: Event) -> Result<()> {
        match event {
            Event::PowerOff => {
                self.state.power_on = false;
                self.change_state(AncState::PowerOff);
                Ok(())
            }
            Event::Enable => {
                self.state.requested_enabled = true;
                let result = self.update_lib_state(true, self.state.requested_mode);
                if self.state.actual_enabled {
                    self.change_state(AncState::Enabled);
                }
                result
            }
            Event::SetMode(mode) => {
                self.check_mode(mode)?;
                // applied on the next enable
                self.state.requested_mode = mode;
                self.refresh_leakthrough_gain();
                Ok(())
            }
            Event::EnterTuning => self.setup_tuning(TuningKind::Static),
            Event::EnterAdaptiveTuning if self.config.adaptive => {
                self.setup_tuning(TuningKind::Adaptive)
            }
            Event::ImplicitEnable => self.on_implicit_enable(),
            Event::ImplicitDisable => self.on_implicit_disable(),
            _ => Err(self.rejected(event)),
        }
    }

    fn handle_enabled(&mut self, event: Event) -> Result<()> {
        match event {
            Event::PowerOff | Event::Disable => {
                let power_off = event == Event::PowerOff;
                if power_off {
                    self.state.power_on = false;
                }
                // only a power-off keeps the request, so it is persisted
                self.state.requested_enabled = power_off;

                self.stop_settle_timers();

                if power_off {
                    self.disable_anc(AncState::PowerOff)
                } else if self.io.audio.is_adaptive_active() {
                    self.io.audio.enable_gentle_mute();
                    self.io
                        .timer
                        .arm(TimerKind::GentleMuteDisable, self.config.timing.gentle_mute);
                    Ok(())
                } else {
                    self.disable_anc(AncState::Disabled)
                }
            }
            Event::SetMode(mode) => {
                self.check_mode(mode)?;
                self.state.requested_mode = mode;

                if mode == self.state.current_mode {
                    return Ok(());
                }
                if self.io.audio.is_adaptive_active() {
                    self.io.audio.enable_gentle_mute();
                    self.io
                        .timer
                        .arm(TimerKind::GentleMuteModeUpdate, self.config.timing.gentle_mute);
                    Ok(())
                } else {
                    self.update_anc_mode()
                }
            }
            Event::EnterTuning => self.setup_tuning(TuningKind::Static),
            Event::EnterAdaptiveTuning if self.config.adaptive => {
                self.setup_tuning(TuningKind::Adaptive)
            }
            Event::SetLeakthroughGain(gain) => {
                self.set_leakthrough_gain(gain);
                Ok(())
            }
            Event::TimerExpired(TimerKind::ConfigSettle) => {
                self.enable_adaptive_anc();
                Ok(())
            }
            Event::TimerExpired(TimerKind::GentleMuteDisable) => {
                self.disable_anc(AncState::Disabled)
            }
            Event::TimerExpired(TimerKind::GentleMuteModeUpdate) => self.update_anc_mode(),
            Event::TimerExpired(TimerKind::PathGainSettle) => {
                self.io.audio.apply_filter_path_gains();
                Ok(())
            }
            Event::QuietModeDetected => {
                if self.quiet_mode_available() {
                    let now = self.wall_now();
                    let effects = self.quiet_mode.on_detected(now);
                    self.apply_sync(effects);
                }
                Ok(())
            }
            Event::QuietModeCleared => {
                if self.quiet_mode_available() {
                    let now = self.wall_now();
                    let effects = self.quiet_mode.on_cleared(now);
                    self.apply_sync(effects);
                }
                Ok(())
            }
            Event::QuietModeFire(direction) => {
                if self.quiet_mode_available() {
                    let effects = self.quiet_mode.on_fire(direction);
                    self.apply_sync(effects);
                }
                Ok(())
            }
            Event::ImplicitEnable => self.on_implicit_enable(),
            Event::ImplicitDisable => self.on_implicit_disable(),
            _ => Err(self.rejected(event)),
        }
    }

    fn handle_tuning(&mut self, kind: TuningKind, event: Event) -> Result<()> {
        match (kind, event) {
            (_, Event::TuningLinkAttached { sample_rate }) => {
                self.state.tuning_sample_rate = Some(sample_rate);
                self.io.audio.enter_tuning(kind, sample_rate);
                Ok(())
            }
            (_, Event::PowerOff) => {
                self.exit_tuning(kind);
                self.state.power_on = false;
                self.change_state(AncState::PowerOff);
                Ok(())
            }
            (TuningKind::Static, Event::ExitTuning)
            | (TuningKind::Adaptive, Event::ExitAdaptiveTuning)
            | (_, Event::TuningLinkDetached) => {
                self.exit_tuning(kind);
                self.change_state(AncState::Disabled);
                Ok(())
            }
            _ => Err(self.rejected(event)),
        }
    }

    fn configure_and_init(&mut self) -> Result<()> {
        self.config.validate()?;

        if !self.config.microphones.any() {
            tracing::error!("ANC failed to initialise: no microphones configured");
            return Err(Error::Initialisation("no ANC microphones configured".into()));
        }

        let num_modes = self.config.num_modes;
        let session = match self.io.store.load() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load session data, using defaults");
                None
            }
        };

        let (enabled, mode) = match session {
            Some(s) if s.mode.index() < num_modes => (s.enabled, s.mode),
            Some(s) => {
                tracing::warn!(mode = %s.mode, num_modes, "persisted mode out of range, using default");
                (s.enabled, self.config.default_mode)
            }
            None => (false, self.config.default_mode),
        };

        if !self.io.audio.initialise(&self.config.microphones, mode) {
            tracing::error!("ANC failed to initialise: microphone configuration or licensing");
            return Err(Error::Initialisation(
                "audio subsystem rejected microphone configuration or licence".into(),
            ));
        }

        self.state.requested_enabled = enabled;
        self.state.requested_mode = mode;
        self.state.current_mode = mode;
        self.state.previous_mode = mode;
        self.state.actual_enabled = false;
        self.state.num_modes = num_modes;
        self.quiet_mode = new_synchronizer(&self.config);

        tracing::info!(num_modes, %mode, was_enabled = enabled, "ANC initialised");
        self.change_state(AncState::PowerOff);
        Ok(())
    }

    fn setup_tuning(&mut self, kind: TuningKind) -> Result<()> {
        let next = match kind {
            TuningKind::Static => AncState::TuningActive,
            TuningKind::Adaptive => AncState::AdaptiveTuningActive,
        };

        if self.state.state == AncState::Enabled {
            self.stop_settle_timers();
            self.disable_anc(next)?;
        } else {
            self.change_state(next);
        }

        self.io.audio.attach_tuning_link(kind);
        Ok(())
    }

    fn exit_tuning(&mut self, kind: TuningKind) {
        self.io.audio.detach_tuning_link();
        self.io.audio.exit_tuning(kind);
        self.state.tuning_sample_rate = None;
    }

    fn check_mode(&self, mode: AncMode) -> Result<()> {
        if mode.index() >= self.state.num_modes {
            return Err(Error::ModeOutOfRange {
                mode,
                num_modes: self.state.num_modes,
            });
        }
        Ok(())
    }
}
