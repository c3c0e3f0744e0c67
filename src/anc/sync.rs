//! Peer input and quiet-mode side effects

use crate::event::{Event, EventSource, PeerAncState, PhyState};
use crate::notify::Notification;
use crate::quiet_mode::{QuietModeRecord, SyncEffect};
use crate::timer::TimerKind;

use super::{AncManager, AncMode, AncState, DEFAULT_SECONDARY_FF_GAIN};

impl AncManager {
    /// Carry out what the synchroniser decided
    pub(super) fn apply_sync(&mut self, effects: Vec<SyncEffect>) {
        for effect in effects {
            tracing::trace!(?effect, "quiet mode effect");
            match effect {
                SyncEffect::ArmFire { direction, after } => {
                    self.io.timer.arm(TimerKind::QuietModeFire(direction), after);
                }
                SyncEffect::FireNow(direction) => {
                    self.queue.push_back(Event::QuietModeFire(direction));
                }
                SyncEffect::CancelFire(direction) => {
                    self.io.timer.cancel(TimerKind::QuietModeFire(direction));
                }
                SyncEffect::Publish(record) => {
                    self.notify(Notification::QuietModeUpdated(record));
                    self.io.peer.send_record(record);
                }
                SyncEffect::EnableQuietMode => {
                    self.io.audio.enable_quiet_mode();
                    self.notify(Notification::QuietModeOn);
                }
                SyncEffect::DisableQuietMode => {
                    self.io.audio.disable_quiet_mode();
                    self.notify(Notification::QuietModeOff);
                }
            }
        }
    }

    /// Drop both records and any scheduled fire
    pub(super) fn reset_quiet_mode(&mut self) {
        let effects = self.quiet_mode.reset();
        self.apply_sync(effects);
    }

    /// Quiet-mode events only matter while adaptive processing runs
    pub(super) fn quiet_mode_available(&self) -> bool {
        let active = self.io.audio.is_adaptive_active();
        if !active {
            tracing::debug!("adaptive processing inactive, quiet mode event ignored");
        }
        active
    }

    pub(super) fn on_peer_quiet_mode(&mut self, record: QuietModeRecord) {
        if self.state.peer_in_case {
            tracing::debug!("peer in case, quiet mode record ignored");
            return;
        }
        let now = self.wall_now();
        let effects = self.quiet_mode.on_peer_record(record, now);
        self.apply_sync(effects);
    }

    /// Align with the peer's enable state, mode and leakthrough gain
    pub(super) fn on_peer_anc_state(&mut self, peer: PeerAncState) {
        if self.state.peer_in_case {
            tracing::debug!("peer in case, ANC state ignored");
            return;
        }

        if peer.enabled != self.is_enabled() {
            let event = if peer.enabled { Event::Enable } else { Event::Disable };
            if let Err(e) = self.handle(event) {
                tracing::warn!(error = %e, "could not follow peer enable state");
            }
        }

        if peer.mode != self.state.requested_mode {
            if let Err(e) = self.handle(Event::SetMode(peer.mode)) {
                tracing::warn!(error = %e, "could not follow peer mode");
            }
        }

        self.sync_leakthrough_gain(peer.leakthrough_gain);
    }

    pub(super) fn on_peer_link_lost(&mut self) {
        tracing::info!("peer link lost, quiet mode reset");
        self.reset_quiet_mode();
    }

    pub(super) fn on_phy_state(&mut self, source: EventSource, phy: PhyState) {
        match source {
            EventSource::Local => self.on_local_phy_state(phy),
            EventSource::Remote => self.on_remote_phy_state(phy),
        }
    }

    fn on_local_phy_state(&mut self, phy: PhyState) {
        self.state.phy_state = phy;

        if !self.state.actual_enabled || self.state.state != AncState::Enabled {
            return;
        }

        match phy {
            PhyState::InEar | PhyState::OutOfEar | PhyState::OutOfEarAtRest => {
                if self.io.audio.is_adaptive_active() {
                    self.io.audio.update_in_ear(phy == PhyState::InEar);
                }
            }
            PhyState::InCase => {
                if let Err(e) = self.handle(Event::Disable) {
                    tracing::warn!(error = %e, "failed to disable ANC on entering case");
                }
            }
        }
    }

    fn on_remote_phy_state(&mut self, phy: PhyState) {
        let in_case = phy == PhyState::InCase;
        let was_in_case = self.state.peer_in_case;
        self.state.peer_in_case = in_case;

        if !in_case || was_in_case {
            return;
        }

        tracing::info!("peer entered case");
        self.reset_quiet_mode();

        if self.adaptive_anc_running() {
            self.notify_both_ff_gains(DEFAULT_SECONDARY_FF_GAIN);
            self.start_ff_gain_timer();
        }
    }

    fn adaptive_anc_running(&self) -> bool {
        self.state.actual_enabled && self.state.current_mode == AncMode::ADAPTIVE
    }
}
