//! Client notifications
//!
//! Clients (UI bridge, companion app, peer-state bridge) subscribe to a
//! broadcast channel. Sending with nobody subscribed is not an error.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::anc::AncMode;
use crate::quiet_mode::QuietModeRecord;

/// Capacity of the notification channel
const CHANNEL_CAPACITY: usize = 64;

/// Something clients may want to know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// ANC hardware switched on or off
    StateChanged {
        /// New state
        enabled: bool,
    },
    /// A new mode was applied
    ModeChanged {
        /// Applied mode
        mode: AncMode,
    },
    /// Leakthrough gain changed
    LeakthroughGainChanged {
        /// New gain
        gain: u8,
    },
    /// Adaptive ANC (enabled in the adaptive mode) started or stopped
    AdaptiveStateChanged {
        /// Adaptive ANC now running
        enabled: bool,
    },
    /// Local adaptive feed-forward gain
    FeedForwardGain {
        /// Gain read from adaptive processing
        gain: u8,
    },
    /// Feed-forward gains of both earbuds
    FeedForwardGains {
        /// Left earbud
        left: u8,
        /// Right earbud
        right: u8,
    },
    /// Local quiet-mode record changed and was published
    QuietModeUpdated(QuietModeRecord),
    /// Quiet mode switched on
    QuietModeOn,
    /// Quiet mode switched off
    QuietModeOff,
}

/// Broadcasts [`Notification`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create a notifier with no subscribers
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver `notification` to current subscribers
    pub fn send(&self, notification: Notification) {
        tracing::debug!(?notification, "notify");
        // Err only means no subscribers
        let _ = self.tx.send(notification);
    }
}
