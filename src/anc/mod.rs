//! ANC state manager
//!
//! [`AncManager`] is the owned context for one earbud: runtime state, the
//! quiet-mode synchroniser, the collaborators and the notification channel.
//! All input arrives through [`AncManager::dispatch`]; follow-up events that
//! a handler produces (for example an already-due quiet-mode fire) are queued
//! and drained before `dispatch` returns, so events are always processed one
//! at a time in arrival order.
//!
//! ```text
//!                ┌────────────── AncManager ───────────────┐
//!   Event ──────►│ dispatch ─► handlers (per AncState)     │
//!                │     │            │                      │
//!                │     ▼            ▼                      │
//!                │  queue     QuietModeSynchronizer        │
//!                └──┬─────────┬──────────┬─────────┬───────┘
//!                   ▼         ▼          ▼         ▼
//!                 Timer   AudioSubsystem PeerLink  Notifier
//! ```

mod call;
mod gain;
mod handlers;
mod hardware;
mod state;
mod sync;

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::audio::AudioSubsystem;
use crate::clock::{ClockBridge, WallClock};
use crate::config::{Config, EarSide, MAX_MODES};
use crate::event::Event;
use crate::notify::{Notification, Notifier};
use crate::peer::PeerLink;
use crate::persist::SessionStore;
use crate::quiet_mode::QuietModeSynchronizer;
use crate::timer::Timer;
use crate::{Error, Result};

pub use gain::ramp_down_steps;
pub use state::AncRuntimeState;

/// Feed-forward gain reported for a peer that is in its case
pub const DEFAULT_SECONDARY_FF_GAIN: u8 = 0;

/// Lifecycle state of the local ANC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AncState {
    /// Configuration not yet loaded
    #[default]
    Uninitialised,
    /// Initialised, device powered off
    PowerOff,
    /// Powered, ANC hardware off
    Disabled,
    /// Powered, ANC hardware on
    Enabled,
    /// Static tuning session
    TuningActive,
    /// Adaptive tuning session
    AdaptiveTuningActive,
}

impl fmt::Display for AncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialised => "uninitialised",
            Self::PowerOff => "power-off",
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::TuningActive => "tuning",
            Self::AdaptiveTuningActive => "adaptive-tuning",
        };
        f.write_str(s)
    }
}

/// Zero-based ANC mode index
///
/// Displayed 1-based ("mode 1" is index 0), matching what users see.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AncMode(u8);

impl AncMode {
    /// Mode in which adaptive ANC runs
    pub const ADAPTIVE: Self = Self(0);

    /// Mode at zero-based `index`
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Mode from a user-facing 1-based number
    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        if number >= 1 && number <= MAX_MODES {
            Some(Self(number - 1))
        } else {
            None
        }
    }

    /// Zero-based index
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Following mode, wrapping to the first after `num_modes`
    #[must_use]
    pub const fn next(self, num_modes: u8) -> Self {
        let next = self.0.saturating_add(1);
        if next >= num_modes { Self(0) } else { Self(next) }
    }
}

impl fmt::Display for AncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode {}", u16::from(self.0) + 1)
    }
}

/// External collaborators the manager drives
pub struct Collaborators {
    /// Audio chain and ANC hardware
    pub audio: Box<dyn AudioSubsystem>,
    /// Session persistence
    pub store: Box<dyn SessionStore>,
    /// Outbound peer link
    pub peer: Box<dyn PeerLink>,
    /// Shared wall clock
    pub clock: Box<dyn ClockBridge>,
    /// Timer capability
    pub timer: Box<dyn Timer>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// ANC state machine and quiet-mode synchroniser for one earbud
#[derive(Debug)]
pub struct AncManager {
    config: Config,
    state: AncRuntimeState,
    quiet_mode: QuietModeSynchronizer,
    io: Collaborators,
    notifier: Notifier,
    queue: VecDeque<Event>,
}

impl AncManager {
    /// Create a manager in the `Uninitialised` state
    #[must_use]
    pub fn new(config: Config, io: Collaborators) -> Self {
        let quiet_mode = new_synchronizer(&config);
        Self {
            config,
            state: AncRuntimeState::default(),
            quiet_mode,
            io,
            notifier: Notifier::new(),
            queue: VecDeque::new(),
        }
    }

    /// Process one event, then any follow-ups it queued
    ///
    /// # Errors
    ///
    /// Returns the outcome of `event` itself. Follow-up failures are logged.
    pub fn dispatch(&mut self, event: Event) -> Result<()> {
        let result = self.handle(event);

        while let Some(next) = self.queue.pop_front() {
            if let Err(e) = self.handle(next) {
                tracing::warn!(event = next.name(), error = %e, "queued event failed");
            }
        }

        result
    }

    /// Subscribe to client notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Notification channel handle
    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // Commands

    /// Initialise from configuration and persisted session
    ///
    /// # Errors
    ///
    /// Returns error if the microphone configuration or hardware probe fails
    pub fn initialise(&mut self) -> Result<()> {
        self.dispatch(Event::Initialise)
    }

    /// User request to enable ANC
    ///
    /// # Errors
    ///
    /// Returns error if not legal in the current state or hardware fails
    pub fn enable(&mut self) -> Result<()> {
        self.dispatch(Event::Enable)
    }

    /// User request to disable ANC
    ///
    /// # Errors
    ///
    /// Returns error if not legal in the current state or hardware fails
    pub fn disable(&mut self) -> Result<()> {
        self.dispatch(Event::Disable)
    }

    /// User mode selection
    ///
    /// # Errors
    ///
    /// Returns error if `mode` is out of range, the state does not accept
    /// mode changes, or the hardware rejects the mode
    pub fn set_mode(&mut self, mode: AncMode) -> Result<()> {
        self.dispatch(Event::SetMode(mode))
    }

    /// Cycle to the next mode
    ///
    /// # Errors
    ///
    /// Same as [`AncManager::set_mode`]
    pub fn set_next_mode(&mut self) -> Result<()> {
        self.dispatch(Event::SetNextMode)
    }

    /// Voice call started
    ///
    /// # Errors
    ///
    /// Returns error if not legal in the current state
    pub fn implicit_enable_request(&mut self) -> Result<()> {
        self.dispatch(Event::ImplicitEnable)
    }

    /// Voice call ended
    ///
    /// # Errors
    ///
    /// Returns error if not legal in the current state
    pub fn implicit_disable_request(&mut self) -> Result<()> {
        self.dispatch(Event::ImplicitDisable)
    }

    // Queries

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> AncState {
        self.state.state
    }

    /// Whether ANC is enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.state == AncState::Enabled
    }

    /// Mode currently applied to the hardware
    #[must_use]
    pub const fn current_mode(&self) -> AncMode {
        self.state.current_mode
    }

    /// Mode that will be applied on next enable
    #[must_use]
    pub const fn requested_mode(&self) -> AncMode {
        self.state.requested_mode
    }

    /// Number of configured modes (zero before initialisation)
    #[must_use]
    pub const fn number_of_modes(&self) -> u8 {
        self.state.num_modes
    }

    /// Leakthrough gain of the current mode
    #[must_use]
    pub const fn leakthrough_gain(&self) -> u8 {
        self.state.leakthrough_gain
    }

    /// Last adaptive feed-forward gain read
    #[must_use]
    pub const fn feed_forward_gain(&self) -> u8 {
        self.state.feed_forward_gain
    }

    /// Whether static tuning is active
    #[must_use]
    pub fn is_tuning_active(&self) -> bool {
        self.state.state == AncState::TuningActive
    }

    /// Whether adaptive tuning is active
    #[must_use]
    pub fn is_adaptive_tuning_active(&self) -> bool {
        self.state.state == AncState::AdaptiveTuningActive
    }

    /// Whether a hardware reconfiguration is in progress
    #[must_use]
    pub const fn is_dsp_clock_boost_required(&self) -> bool {
        self.state.dsp_clock_boost
    }

    /// Full runtime state
    #[must_use]
    pub const fn runtime(&self) -> &AncRuntimeState {
        &self.state
    }

    /// Quiet-mode synchroniser
    #[must_use]
    pub const fn quiet_mode(&self) -> &QuietModeSynchronizer {
        &self.quiet_mode
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn wall_now(&self) -> WallClock {
        self.io.clock.wall_clock_now().unwrap_or_else(|| {
            tracing::warn!("wall clock unavailable, using zero");
            WallClock::ZERO
        })
    }

    fn notify(&self, notification: Notification) {
        self.notifier.send(notification);
    }

    fn rejected(&self, event: Event) -> Error {
        Error::Rejected {
            event: event.name(),
            state: self.state.state,
        }
    }
}

/// Quiet-mode synchroniser for `config`; the left earbud wins election ties
fn new_synchronizer(config: &Config) -> QuietModeSynchronizer {
    QuietModeSynchronizer::new(config.timing.quiet_mode_delay)
        .with_tie_priority(config.side == EarSide::Left)
}
