//! Two-earbud simulation on virtual time
//!
//! Wires two [`AncManager`]s to each other through latest-wins peer links
//! and drives both from [`VirtualTimer`]s sharing one time base, so a
//! quiet-mode negotiation runs the same way every time.
//!
//! Peer records are only delivered when [`SimulatedPair::deliver`] runs
//! (also done after every timer step of [`SimulatedPair::run_until`]), which
//! lets callers stage events on both sides "in the same tick" before either
//! sees the other's update.

use std::time::Duration;

use tokio::sync::watch;

use crate::anc::{AncManager, Collaborators};
use crate::audio::{AudioSubsystem, SimulatedAudio};
use crate::clock::WallClock;
use crate::config::{Config, EarSide};
use crate::event::Event;
use crate::peer::WatchPeerLink;
use crate::persist::{MemorySessionStore, SessionStore};
use crate::quiet_mode::QuietModeRecord;
use crate::timer::VirtualTimer;
use crate::Result;

/// Shared wall-clock reading at virtual time zero
pub const WALL_CLOCK_ORIGIN: WallClock = WallClock::from_micros(1_000_000);

/// Upper bound on back-and-forth exchanges settled in one delivery pass
const MAX_EXCHANGES: usize = 16;

/// Per-earbud collaborators supplied by the caller
pub struct EarbudParts {
    /// Manager configuration; `side` is overwritten by the pair
    pub config: Config,
    /// Audio subsystem
    pub audio: Box<dyn AudioSubsystem>,
    /// Session store
    pub store: Box<dyn SessionStore>,
}

impl EarbudParts {
    /// Simulated audio and an in-memory store
    #[must_use]
    pub fn simulated(name: &str, config: Config) -> Self {
        Self {
            config,
            audio: Box::new(SimulatedAudio::new(name)),
            store: Box::new(MemorySessionStore::default()),
        }
    }
}

struct SimulatedEarbud {
    manager: AncManager,
    timer: VirtualTimer,
    inbox: watch::Receiver<Option<QuietModeRecord>>,
}

impl SimulatedEarbud {
    fn dispatch(&mut self, event: Event) {
        if let Err(e) = self.manager.dispatch(event) {
            tracing::debug!(side = %self.manager.config().side, event = event.name(), error = %e, "simulated event failed");
        }
    }

    /// Take the peer's latest record, if one arrived since the last call
    fn take_inbound(&mut self) -> Option<QuietModeRecord> {
        if self.inbox.has_changed().unwrap_or(false) {
            *self.inbox.borrow_and_update()
        } else {
            None
        }
    }

    fn fire_due(&mut self) {
        while let Some(kind) = self.timer.pop_due() {
            self.dispatch(Event::TimerExpired(kind));
        }
    }
}

/// Left and right earbud linked to each other
pub struct SimulatedPair {
    left: SimulatedEarbud,
    right: SimulatedEarbud,
}

impl SimulatedPair {
    /// Build a pair from caller-supplied parts
    #[must_use]
    pub fn new(left: EarbudParts, right: EarbudParts) -> Self {
        let (left_link, right_inbox) = WatchPeerLink::new();
        let (right_link, left_inbox) = WatchPeerLink::new();

        let build = |mut parts: EarbudParts,
                     side: EarSide,
                     link: WatchPeerLink,
                     inbox: watch::Receiver<Option<QuietModeRecord>>| {
            parts.config.side = side;
            let timer = VirtualTimer::new();
            let io = Collaborators {
                audio: parts.audio,
                store: parts.store,
                peer: Box::new(link),
                clock: Box::new(timer.clock_bridge(WALL_CLOCK_ORIGIN)),
                timer: Box::new(timer.clone()),
            };
            SimulatedEarbud {
                manager: AncManager::new(parts.config, io),
                timer,
                inbox,
            }
        };

        Self {
            left: build(left, EarSide::Left, left_link, left_inbox),
            right: build(right, EarSide::Right, right_link, right_inbox),
        }
    }

    /// Pair with simulated audio and in-memory stores
    #[must_use]
    pub fn simulated(config: &Config) -> Self {
        Self::new(
            EarbudParts::simulated("left", config.clone()),
            EarbudParts::simulated("right", config.clone()),
        )
    }

    fn earbud(&self, side: EarSide) -> &SimulatedEarbud {
        match side {
            EarSide::Left => &self.left,
            EarSide::Right => &self.right,
        }
    }

    fn earbud_mut(&mut self, side: EarSide) -> &mut SimulatedEarbud {
        match side {
            EarSide::Left => &mut self.left,
            EarSide::Right => &mut self.right,
        }
    }

    /// Manager of one earbud
    #[must_use]
    pub fn manager(&self, side: EarSide) -> &AncManager {
        &self.earbud(side).manager
    }

    /// Virtual timer of one earbud
    #[must_use]
    pub fn timer(&self, side: EarSide) -> &VirtualTimer {
        &self.earbud(side).timer
    }

    /// Current virtual time
    #[must_use]
    pub fn now(&self) -> Duration {
        self.left.timer.now()
    }

    /// Dispatch `event` to one earbud without delivering peer records
    ///
    /// # Errors
    ///
    /// Returns the manager's result for `event`
    pub fn dispatch(&mut self, side: EarSide, event: Event) -> Result<()> {
        self.earbud_mut(side).manager.dispatch(event)
    }

    /// Dispatch `event` to both earbuds, left first
    pub fn dispatch_both(&mut self, event: Event) {
        self.left.dispatch(event);
        self.right.dispatch(event);
    }

    /// Initialise, power on and enable both earbuds, then let adaptive
    /// processing start
    pub fn bring_up(&mut self) {
        for event in [Event::Initialise, Event::PowerOn, Event::Enable] {
            self.dispatch_both(event);
        }
        let now = self.now();
        self.run_until(now);
    }

    /// Deliver pending peer records until both inboxes are quiet
    ///
    /// Left is served before right. Returns the number of records delivered.
    pub fn deliver(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_EXCHANGES {
            let mut any = false;
            if let Some(record) = self.left.take_inbound() {
                self.left.dispatch(Event::PeerQuietMode(record));
                any = true;
                delivered += 1;
            }
            if let Some(record) = self.right.take_inbound() {
                self.right.dispatch(Event::PeerQuietMode(record));
                any = true;
                delivered += 1;
            }
            if !any {
                break;
            }
        }
        delivered
    }

    /// Hand each earbud the record the other has pending before either
    /// processes it, as when both updates are in flight at once
    ///
    /// Returns the number of records delivered.
    pub fn deliver_crossed(&mut self) -> usize {
        let to_left = self.left.take_inbound();
        let to_right = self.right.take_inbound();
        let mut delivered = 0;

        for (earbud, record) in [(&mut self.left, to_left), (&mut self.right, to_right)] {
            if let Some(record) = record {
                earbud.dispatch(Event::PeerQuietMode(record));
                delivered += 1;
            }
        }
        delivered
    }

    /// Run both earbuds' timers up to virtual time `t`
    pub fn run_until(&mut self, t: Duration) {
        self.deliver();
        loop {
            let next = [self.left.timer.next_deadline(), self.right.timer.next_deadline()]
                .into_iter()
                .flatten()
                .min();
            let Some(at) = next.filter(|at| *at <= t) else {
                break;
            };

            self.left.timer.advance_to(at);
            self.right.timer.advance_to(at);
            self.left.fire_due();
            self.right.fire_due();
            self.deliver();
        }
        self.left.timer.advance_to(t);
        self.right.timer.advance_to(t);
    }

    /// Run for `d` past the current virtual time
    pub fn run_for(&mut self, d: Duration) {
        let t = self.now() + d;
        self.run_until(t);
    }
}
