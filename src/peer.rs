//! Peer-link transport
//!
//! Outbound quiet-mode records are fire-and-forget and latest-wins: a record
//! that has not been picked up by the peer yet is replaced by a newer one.
//! A `tokio::sync::watch` channel has exactly those semantics.

use tokio::sync::watch;

use crate::quiet_mode::QuietModeRecord;

/// Sends the local quiet-mode record to the peer
pub trait PeerLink: Send {
    /// Queue `record` for delivery, superseding any undelivered record
    fn send_record(&mut self, record: QuietModeRecord);
}

/// Latest-wins link over a watch channel
#[derive(Debug)]
pub struct WatchPeerLink {
    tx: watch::Sender<Option<QuietModeRecord>>,
}

impl WatchPeerLink {
    /// Create a link and the receiving end the peer reads from
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<Option<QuietModeRecord>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl PeerLink for WatchPeerLink {
    fn send_record(&mut self, record: QuietModeRecord) {
        // no receiver just means the peer is not connected
        let _ = self.tx.send_replace(Some(record));
        tracing::trace!(?record, "quiet-mode record queued for peer");
    }
}

/// Link that drops everything, for a device without a peer
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPeerLink;

impl PeerLink for NullPeerLink {
    fn send_record(&mut self, record: QuietModeRecord) {
        tracing::trace!(?record, "no peer, dropping quiet-mode record");
    }
}
