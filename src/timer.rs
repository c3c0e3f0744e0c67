//! Timer capability
//!
//! Every timed behaviour of the manager (settle delays, gentle mute, gain
//! polling, quiet-mode fire) goes through [`Timer`]. Arming a kind that is
//! already pending replaces it, so no kind is ever delivered twice for one
//! arm.
//!
//! Two backends are provided: [`VirtualTimer`] advances only when driven,
//! which makes wall-clock negotiation between two simulated earbuds
//! deterministic; [`TokioTimer`] spawns a sleeping task per pending kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::{ClockBridge, WallClock};
use crate::quiet_mode::QuietModeDirection;

/// Identifies one class of timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Delay before adaptive processing starts after hardware enable
    ConfigSettle,
    /// Gentle mute elapsed, complete the pending disable
    GentleMuteDisable,
    /// Gentle mute elapsed, apply the pending mode
    GentleMuteModeUpdate,
    /// Static filter path gains may be applied
    PathGainSettle,
    /// Periodic read of the adaptive feed-forward gain
    FeedForwardGainPoll,
    /// Agreed quiet-mode instant
    QuietModeFire(QuietModeDirection),
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigSettle => write!(f, "config-settle"),
            Self::GentleMuteDisable => write!(f, "gentle-mute-disable"),
            Self::GentleMuteModeUpdate => write!(f, "gentle-mute-mode-update"),
            Self::PathGainSettle => write!(f, "path-gain-settle"),
            Self::FeedForwardGainPoll => write!(f, "ff-gain-poll"),
            Self::QuietModeFire(d) => write!(f, "quiet-mode-{d}"),
        }
    }
}

/// Schedules delayed re-entry into the manager's dispatch point
pub trait Timer: Send {
    /// Arm `kind` to expire after `after`, replacing any pending instance
    fn arm(&mut self, kind: TimerKind, after: Duration);

    /// Cancel a pending instance of `kind`, if any
    fn cancel(&mut self, kind: TimerKind);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct VirtualState {
    now: Duration,
    seq: u64,
    pending: Vec<(Duration, u64, TimerKind)>,
}

/// Timer driven by an explicit virtual clock
///
/// Clones share the same clock and pending set: hand one clone to the
/// manager and keep another to drive time forward.
#[derive(Debug, Clone, Default)]
pub struct VirtualTimer {
    inner: Arc<Mutex<VirtualState>>,
}

impl VirtualTimer {
    /// Create a timer at virtual time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    #[must_use]
    pub fn now(&self) -> Duration {
        lock(&self.inner).now
    }

    /// Earliest pending deadline
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        lock(&self.inner).pending.iter().map(|(at, _, _)| *at).min()
    }

    /// Move virtual time forward to `t` (never backwards)
    pub fn advance_to(&self, t: Duration) {
        let mut state = lock(&self.inner);
        if t > state.now {
            state.now = t;
        }
    }

    /// Remove and return the earliest timer due at the current time
    ///
    /// Timers with equal deadlines come out in arming order.
    pub fn pop_due(&self) -> Option<TimerKind> {
        let mut state = lock(&self.inner);
        let now = state.now;
        let idx = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, (at, _, _))| *at <= now)
            .min_by_key(|(_, (at, seq, _))| (*at, *seq))
            .map(|(i, _)| i)?;
        Some(state.pending.remove(idx).2)
    }

    /// Whether `kind` is pending
    #[must_use]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        lock(&self.inner).pending.iter().any(|(_, _, k)| *k == kind)
    }

    /// Time left on a pending `kind`
    #[must_use]
    pub fn remaining(&self, kind: TimerKind) -> Option<Duration> {
        let state = lock(&self.inner);
        state
            .pending
            .iter()
            .find(|(_, _, k)| *k == kind)
            .map(|(at, _, _)| at.saturating_sub(state.now))
    }

    /// Number of pending timers
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Wall-clock bridge reading this timer's virtual time plus `offset`
    #[must_use]
    pub fn clock_bridge(&self, offset: WallClock) -> VirtualClockBridge {
        VirtualClockBridge {
            timer: self.clone(),
            offset,
        }
    }
}

impl Timer for VirtualTimer {
    fn arm(&mut self, kind: TimerKind, after: Duration) {
        let mut state = lock(&self.inner);
        state.pending.retain(|(_, _, k)| *k != kind);
        let at = state.now + after;
        state.seq += 1;
        let seq = state.seq;
        state.pending.push((at, seq, kind));
        tracing::trace!(%kind, ?after, "virtual timer armed");
    }

    fn cancel(&mut self, kind: TimerKind) {
        lock(&self.inner).pending.retain(|(_, _, k)| *k != kind);
        tracing::trace!(%kind, "virtual timer cancelled");
    }
}

/// Wall clock derived from a [`VirtualTimer`]
#[derive(Debug, Clone)]
pub struct VirtualClockBridge {
    timer: VirtualTimer,
    offset: WallClock,
}

impl ClockBridge for VirtualClockBridge {
    fn wall_clock_now(&self) -> Option<WallClock> {
        Some(self.offset.add(self.timer.now()))
    }
}

/// Expiry message produced by [`TokioTimer`]
#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    kind: TimerKind,
    generation: u64,
}

#[derive(Debug, Default)]
struct TokioState {
    generation: u64,
    pending: HashMap<TimerKind, (u64, JoinHandle<()>)>,
}

/// Timer backed by tokio sleeps
///
/// Expiries arrive on the channel given at construction and must be passed
/// through [`TokioTimer::accept`], which drops any that were cancelled or
/// re-armed after the sleep had already completed.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    tx: mpsc::UnboundedSender<TimerFired>,
    state: Arc<Mutex<TokioState>>,
}

impl TokioTimer {
    /// Create a timer and the receiver its expiries arrive on
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = Self {
            tx,
            state: Arc::new(Mutex::new(TokioState::default())),
        };
        (timer, rx)
    }

    /// Resolve an expiry, returning the kind if it is still current
    #[must_use]
    pub fn accept(&self, fired: TimerFired) -> Option<TimerKind> {
        let mut state = lock(&self.state);
        let current = state
            .pending
            .get(&fired.kind)
            .is_some_and(|(generation, _)| *generation == fired.generation);
        if current {
            state.pending.remove(&fired.kind);
            Some(fired.kind)
        } else {
            tracing::trace!(kind = %fired.kind, "dropping stale timer expiry");
            None
        }
    }
}

impl Timer for TokioTimer {
    fn arm(&mut self, kind: TimerKind, after: Duration) {
        let mut state = lock(&self.state);
        state.generation += 1;
        let generation = state.generation;

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // receiver gone means the daemon is shutting down
            let _ = tx.send(TimerFired { kind, generation });
        });

        if let Some((_, old)) = state.pending.insert(kind, (generation, handle)) {
            old.abort();
        }
        tracing::trace!(%kind, ?after, "timer armed");
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, handle)) = lock(&self.state).pending.remove(&kind) {
            handle.abort();
            tracing::trace!(%kind, "timer cancelled");
        }
    }
}
