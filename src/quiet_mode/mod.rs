//! Quiet-mode peer synchronisation
//!
//! When both earbuds report ambient silence, the pair agrees on a single
//! wall-clock instant at which both switch adaptive quiet mode on, and
//! likewise for switching it off when either side leaves the quiet
//! condition. There is no coordinator: whichever side first observes the
//! election condition becomes the initiator and publishes the instant.
//!
//! ```text
//!   local detect ──► elect? ──yes──► ts = now + delay ──► arm fire, publish
//!                                                             │
//!   peer record ◄─────────────────────────────────────────────┘
//!        │
//!        ├── request pending ──► arm fire for (ts - now), or fire now
//!        └── no request      ──► re-run election locally (collision rescue)
//! ```

mod record;
mod sync;

pub use record::{QuietModeDirection, QuietModeRecord};
pub use sync::{QuietModeSynchronizer, SyncEffect};
