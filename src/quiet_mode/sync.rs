//! Initiator election and transition scheduling

use std::time::Duration;

use crate::clock::WallClock;

use super::record::{QuietModeDirection, QuietModeRecord};

/// Side effect requested by the synchroniser
///
/// The synchroniser never touches timers, the audio subsystem or the peer
/// link itself; the owner applies these in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEffect {
    /// Arm the fire timer for `direction`
    ArmFire {
        /// Transition to fire
        direction: QuietModeDirection,
        /// Local delay until the agreed instant
        after: Duration,
    },
    /// The agreed instant has already passed, fire straight away
    FireNow(QuietModeDirection),
    /// Cancel a pending fire timer
    CancelFire(QuietModeDirection),
    /// Publish the local record to clients and the peer
    Publish(QuietModeRecord),
    /// Switch the audio subsystem's quiet mode on
    EnableQuietMode,
    /// Switch the audio subsystem's quiet mode off
    DisableQuietMode,
}

/// Owns the local and mirrored remote records and decides every transition
///
/// Decisions are pure functions of the two records plus the wall-clock
/// reading passed in by the caller.
#[derive(Debug, Clone)]
pub struct QuietModeSynchronizer {
    local: QuietModeRecord,
    remote: QuietModeRecord,
    delay: Duration,
    wins_ties: bool,
}

impl QuietModeSynchronizer {
    /// Create a synchroniser with zeroed records
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            local: QuietModeRecord::default(),
            remote: QuietModeRecord::default(),
            delay,
            wins_ties: false,
        }
    }

    /// Whether this side keeps its request when both initiators picked the
    /// same instant; exactly one earbud of a pair must be given priority
    #[must_use]
    pub const fn with_tie_priority(mut self, wins_ties: bool) -> Self {
        self.wins_ties = wins_ties;
        self
    }

    /// Local record
    #[must_use]
    pub const fn local(&self) -> &QuietModeRecord {
        &self.local
    }

    /// Mirror of the peer's record
    #[must_use]
    pub const fn remote(&self) -> &QuietModeRecord {
        &self.remote
    }

    /// Delay between an initiator's decision and the agreed instant
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Local ambient silence detected
    pub fn on_detected(&mut self, now: WallClock) -> Vec<SyncEffect> {
        self.local.detected = true;
        let mut effects = Vec::new();
        self.enable_tx(now, &mut effects);
        effects
    }

    /// Local ambient silence cleared
    pub fn on_cleared(&mut self, now: WallClock) -> Vec<SyncEffect> {
        self.local.detected = false;
        let mut effects = Vec::new();
        self.disable_tx(now, &mut effects);
        effects
    }

    /// Inbound snapshot of the peer's record
    pub fn on_peer_record(&mut self, record: QuietModeRecord, now: WallClock) -> Vec<SyncEffect> {
        self.remote = record;
        let mut effects = Vec::new();

        if let Some(direction) = record.pending() {
            if self.local.requested(direction) {
                if self.keeps_own_request(record.timestamp) {
                    tracing::debug!(%direction, ours = %self.local.timestamp, theirs = %record.timestamp, "both initiated, keeping own instant");
                    return effects;
                }
                tracing::debug!(%direction, ours = %self.local.timestamp, theirs = %record.timestamp, "both initiated, yielding to peer");
                self.yield_request(direction);
                effects.push(SyncEffect::Publish(self.local));
            }

            match record.timestamp.until(now) {
                Some(after) => {
                    tracing::debug!(%direction, ?after, "following peer quiet-mode request");
                    effects.push(SyncEffect::ArmFire { direction, after });
                }
                None => {
                    tracing::debug!(%direction, ts = %record.timestamp, %now, "peer request already due");
                    effects.push(SyncEffect::FireNow(direction));
                }
            }
        }

        // peer has seen the condition but is not initiating; try to take over
        if !record.has_request() {
            self.enable_tx(now, &mut effects);
            self.disable_tx(now, &mut effects);
        }

        effects
    }

    /// The agreed instant for `direction` has arrived
    pub fn on_fire(&mut self, direction: QuietModeDirection) -> Vec<SyncEffect> {
        if !self.local.requested(direction) && !self.remote.requested(direction) {
            tracing::debug!(%direction, "quiet-mode fire with no pending request, ignoring");
            return Vec::new();
        }

        match direction {
            QuietModeDirection::Enable => {
                self.local.enable_requested = false;
                self.remote.enable_requested = false;
                self.local.enabled = true;
                self.local.timestamp = WallClock::ZERO;
                tracing::info!("quiet mode on");
                vec![SyncEffect::EnableQuietMode]
            }
            QuietModeDirection::Disable => {
                self.local = QuietModeRecord::default();
                self.remote = QuietModeRecord::default();
                tracing::info!("quiet mode off");
                vec![SyncEffect::DisableQuietMode]
            }
        }
    }

    /// Drop all negotiation state on both records
    pub fn reset(&mut self) -> Vec<SyncEffect> {
        self.local = QuietModeRecord::default();
        self.remote = QuietModeRecord::default();
        vec![
            SyncEffect::CancelFire(QuietModeDirection::Enable),
            SyncEffect::CancelFire(QuietModeDirection::Disable),
        ]
    }

    /// Earlier instant wins; equal instants go to the side with priority
    fn keeps_own_request(&self, theirs: WallClock) -> bool {
        match theirs.delta_since(self.local.timestamp) {
            d if d > 0 => true,
            0 => self.wins_ties,
            _ => false,
        }
    }

    fn yield_request(&mut self, direction: QuietModeDirection) {
        match direction {
            QuietModeDirection::Enable => self.local.enable_requested = false,
            QuietModeDirection::Disable => self.local.disable_requested = false,
        }
        self.local.timestamp = WallClock::ZERO;
    }

    fn is_enable_initiator(&self) -> bool {
        !self.local.enable_requested
            && !self.remote.enable_requested
            && self.local.detected
            && self.remote.detected
    }

    fn is_disable_initiator(&self) -> bool {
        !self.local.disable_requested && !self.remote.disable_requested && !self.local.detected
    }

    fn enable_tx(&mut self, now: WallClock, effects: &mut Vec<SyncEffect>) {
        if self.local.enabled || self.local.has_request() {
            return;
        }
        if self.is_enable_initiator() {
            tracing::info!(%now, "initiating quiet-mode enable");
            self.schedule(QuietModeDirection::Enable, now, effects);
        } else if self.local.detected {
            effects.push(SyncEffect::Publish(self.local));
        }
    }

    fn disable_tx(&mut self, now: WallClock, effects: &mut Vec<SyncEffect>) {
        if !self.local.enabled || self.local.has_request() {
            return;
        }
        if self.is_disable_initiator() {
            tracing::info!(%now, "initiating quiet-mode disable");
            self.schedule(QuietModeDirection::Disable, now, effects);
        }
    }

    fn schedule(
        &mut self,
        direction: QuietModeDirection,
        now: WallClock,
        effects: &mut Vec<SyncEffect>,
    ) {
        self.local.timestamp = now.add(self.delay);
        match direction {
            QuietModeDirection::Enable => self.local.enable_requested = true,
            QuietModeDirection::Disable => self.local.disable_requested = true,
        }
        effects.push(SyncEffect::ArmFire {
            direction,
            after: self.delay,
        });
        effects.push(SyncEffect::Publish(self.local));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(200);

    fn at(us: u32) -> WallClock {
        WallClock::from_micros(us)
    }

    fn detected() -> QuietModeRecord {
        QuietModeRecord {
            detected: true,
            ..Default::default()
        }
    }

    fn arms(effects: &[SyncEffect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, SyncEffect::ArmFire { .. } | SyncEffect::FireNow(_)))
            .count()
    }

    #[test]
    fn single_side_detection_elects_nobody() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        let effects = sync.on_detected(at(1_000));

        assert_eq!(arms(&effects), 0);
        assert_eq!(effects, vec![SyncEffect::Publish(detected())]);
        assert!(!sync.local().has_request());
    }

    #[test]
    fn both_detected_local_becomes_initiator() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        sync.on_peer_record(detected(), at(500));
        let effects = sync.on_detected(at(1_000));

        assert_eq!(arms(&effects), 1);
        assert_eq!(
            effects[0],
            SyncEffect::ArmFire {
                direction: QuietModeDirection::Enable,
                after: DELAY
            }
        );
        assert!(sync.local().enable_requested);
        assert_eq!(sync.local().timestamp, at(201_000));
        assert!(matches!(effects[1], SyncEffect::Publish(r) if r.enable_requested));
    }

    #[test]
    fn follower_schedules_remaining_delta() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        let peer = QuietModeRecord {
            detected: true,
            enable_requested: true,
            timestamp: at(200_000),
            ..Default::default()
        };
        let effects = sync.on_peer_record(peer, at(150_000));

        assert_eq!(
            effects,
            vec![SyncEffect::ArmFire {
                direction: QuietModeDirection::Enable,
                after: Duration::from_millis(50)
            }]
        );
    }

    #[test]
    fn late_follower_fires_immediately() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        let peer = QuietModeRecord {
            detected: true,
            enable_requested: true,
            timestamp: at(200_000),
            ..Default::default()
        };

        let on_time = sync.on_peer_record(peer, at(200_000));
        assert_eq!(on_time, vec![SyncEffect::FireNow(QuietModeDirection::Enable)]);

        let late = sync.on_peer_record(peer, at(250_000));
        assert_eq!(late, vec![SyncEffect::FireNow(QuietModeDirection::Enable)]);
    }

    #[test]
    fn duplicate_peer_record_is_idempotent() {
        let mut once = QuietModeSynchronizer::new(DELAY);
        once.on_detected(at(0));
        once.on_peer_record(detected(), at(10));

        let mut twice = once.clone();
        twice.on_peer_record(detected(), at(10));

        assert_eq!(once.local(), twice.local());
        assert_eq!(once.remote(), twice.remote());
    }

    #[test]
    fn collision_rescue_on_peer_detection() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        sync.on_detected(at(0));
        let effects = sync.on_peer_record(detected(), at(1_000));

        assert_eq!(arms(&effects), 1);
        assert!(sync.local().enable_requested);
    }

    #[test]
    fn fire_enable_clears_requests_and_sets_enabled() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        sync.on_peer_record(detected(), at(0));
        sync.on_detected(at(0));

        let effects = sync.on_fire(QuietModeDirection::Enable);
        assert_eq!(effects, vec![SyncEffect::EnableQuietMode]);
        assert!(sync.local().enabled);
        assert!(!sync.local().enable_requested);
        assert!(sync.local().timestamp.is_zero());

        // second fire has nothing pending
        assert!(sync.on_fire(QuietModeDirection::Enable).is_empty());
    }

    #[test]
    fn clearing_after_enable_initiates_disable() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        sync.on_peer_record(detected(), at(0));
        sync.on_detected(at(0));
        sync.on_fire(QuietModeDirection::Enable);

        let effects = sync.on_cleared(at(5_000));
        assert_eq!(
            effects[0],
            SyncEffect::ArmFire {
                direction: QuietModeDirection::Disable,
                after: DELAY
            }
        );
        assert!(sync.local().disable_requested);

        let effects = sync.on_fire(QuietModeDirection::Disable);
        assert_eq!(effects, vec![SyncEffect::DisableQuietMode]);
        assert_eq!(*sync.local(), QuietModeRecord::default());
        assert_eq!(*sync.remote(), QuietModeRecord::default());
    }

    #[test]
    fn clearing_while_not_enabled_does_nothing() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        sync.on_detected(at(0));
        assert!(sync.on_cleared(at(10)).is_empty());
    }

    #[test]
    fn reset_zeroes_and_cancels() {
        let mut sync = QuietModeSynchronizer::new(DELAY);
        sync.on_peer_record(detected(), at(0));
        sync.on_detected(at(0));

        let effects = sync.reset();
        assert_eq!(effects.len(), 2);
        assert_eq!(*sync.local(), QuietModeRecord::default());
        assert_eq!(*sync.remote(), QuietModeRecord::default());
    }

    fn request_at(us: u32) -> QuietModeRecord {
        QuietModeRecord {
            detected: true,
            enable_requested: true,
            timestamp: at(us),
            ..Default::default()
        }
    }

    /// Local initiated at `at(10_000)`, so its instant is `at(210_000)`
    fn initiated(wins_ties: bool) -> QuietModeSynchronizer {
        let mut sync = QuietModeSynchronizer::new(DELAY).with_tie_priority(wins_ties);
        sync.on_detected(at(0));
        sync.on_peer_record(detected(), at(10_000));
        assert!(sync.local().enable_requested);
        sync
    }

    #[test]
    fn crossed_requests_keep_the_earlier_instant() {
        let mut sync = initiated(false);

        let effects = sync.on_peer_record(request_at(220_000), at(25_000));
        assert!(effects.is_empty(), "own timer must stay armed");
        assert!(sync.local().enable_requested);
        assert_eq!(sync.local().timestamp, at(210_000));
    }

    #[test]
    fn crossed_requests_yield_to_an_earlier_peer() {
        let mut sync = initiated(true);

        let effects = sync.on_peer_record(request_at(205_000), at(25_000));
        assert!(!sync.local().has_request());
        assert!(sync.local().timestamp.is_zero());
        assert_eq!(
            effects,
            vec![
                SyncEffect::Publish(*sync.local()),
                SyncEffect::ArmFire {
                    direction: QuietModeDirection::Enable,
                    after: Duration::from_millis(180)
                },
            ]
        );

        // the peer's instant still fires here
        assert_eq!(
            sync.on_fire(QuietModeDirection::Enable),
            vec![SyncEffect::EnableQuietMode]
        );
    }

    #[test]
    fn equal_instants_resolved_by_priority() {
        let mut left = initiated(true);
        let mut right = initiated(false);

        assert!(left.on_peer_record(request_at(210_000), at(25_000)).is_empty());
        right.on_peer_record(request_at(210_000), at(25_000));

        assert!(left.local().enable_requested);
        assert!(!right.local().enable_requested);
    }
}
