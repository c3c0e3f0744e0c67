//! Earbud ANC - active noise cancellation control for true-wireless earbuds
//!
//! This library provides the control plane that runs on each earbud:
//! - ANC state machine (power, enable, modes, tuning sessions)
//! - Voice-call override
//! - Quiet-mode synchronisation with the peer earbud
//! - Leakthrough and feed-forward gain reporting
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Inputs                          │
//! │  User  │  Call  │  Phy state  │  Peer  │  Timers    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Event
//! ┌────────────────────▼────────────────────────────────┐
//! │                  AncManager                          │
//! │  State machine  │  Call override  │  Quiet mode     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Collaborators                        │
//! │  Audio  │  Session store  │  Peer link  │  Clock    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod anc;
pub mod audio;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event;
pub mod notify;
pub mod peer;
pub mod persist;
pub mod quiet_mode;
pub mod sim;
pub mod timer;

pub use anc::{AncManager, AncMode, AncState, Collaborators};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use event::Event;
pub use notify::Notification;
