//! Configuration management
//!
//! Precedence: environment > TOML file > defaults. Defaults describe a
//! hybrid adaptive earbud with ten modes.

pub mod file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::anc::AncMode;
use crate::audio::GainPath;
use crate::{Error, Result};

/// Largest number of modes the hardware supports
pub const MAX_MODES: u8 = 10;

/// Filter path layout of the ANC hardware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncPath {
    FeedForward,
    FeedForwardLeftOnly,
    FeedForwardRightOnly,
    FeedBack,
    FeedBackLeftOnly,
    FeedBackRightOnly,
    #[default]
    Hybrid,
    HybridLeftOnly,
    HybridRightOnly,
}

impl AncPath {
    /// Path carrying the leakthrough gain and controlled by adaptive processing
    #[must_use]
    pub const fn control_path(self) -> Option<GainPath> {
        match self {
            Self::FeedForward | Self::FeedForwardLeftOnly | Self::FeedBack | Self::FeedBackLeftOnly => {
                Some(GainPath::Ffa)
            }
            Self::Hybrid | Self::HybridLeftOnly => Some(GainPath::Ffb),
            Self::FeedForwardRightOnly | Self::FeedBackRightOnly | Self::HybridRightOnly => None,
        }
    }

    /// Left channel (instance 0) in use
    #[must_use]
    pub const fn uses_left(self) -> bool {
        !matches!(
            self,
            Self::FeedForwardRightOnly | Self::FeedBackRightOnly | Self::HybridRightOnly
        )
    }

    /// Right channel (instance 1) in use
    #[must_use]
    pub const fn uses_right(self) -> bool {
        !matches!(
            self,
            Self::FeedForwardLeftOnly | Self::FeedBackLeftOnly | Self::HybridLeftOnly
        )
    }
}

/// Which ear the device sits in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarSide {
    #[default]
    Left,
    Right,
}

impl FromStr for EarSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            other => Err(Error::Config(format!("invalid ear side: {other}"))),
        }
    }
}

impl fmt::Display for EarSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Microphone assignment; `None` means not fitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MicConfig {
    pub feed_forward_left: Option<u8>,
    pub feed_forward_right: Option<u8>,
    pub feed_back_left: Option<u8>,
    pub feed_back_right: Option<u8>,
}

impl MicConfig {
    /// Whether any ANC microphone is fitted
    #[must_use]
    pub const fn any(&self) -> bool {
        self.feed_forward_left.is_some()
            || self.feed_forward_right.is_some()
            || self.feed_back_left.is_some()
            || self.feed_back_right.is_some()
    }
}

/// Voice-call override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallConfig {
    /// Force ANC on for the duration of a call
    pub implicit_enable: bool,
    /// Mode used during a call
    pub mode: AncMode,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            implicit_enable: true,
            mode: AncMode::new(1),
        }
    }
}

/// Timer durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingConfig {
    /// Delay from quiet-mode initiation to the agreed instant
    pub quiet_mode_delay: Duration,
    /// Gentle-mute ramp before a filter swap or disable
    pub gentle_mute: Duration,
    /// Hardware configuration settle before adaptive processing starts
    pub config_settle: Duration,
    /// Adaptive feed-forward gain poll interval
    pub ff_gain_poll: Duration,
    /// Settle before static filter path gains are applied
    pub path_gain_settle: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            quiet_mode_delay: Duration::from_millis(200),
            gentle_mute: Duration::from_millis(100),
            config_settle: Duration::ZERO,
            ff_gain_poll: Duration::from_millis(250),
            path_gain_settle: Duration::from_millis(500),
        }
    }
}

/// Session persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistConfig {
    /// Save the enabled state at power-off
    pub enabled: bool,
    /// Save the mode at power-off
    pub mode: bool,
    /// Session file
    pub path: PathBuf,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: true,
            path: default_session_path(),
        }
    }
}

/// Session file location (`~/.local/share/earbud-anc/session.json` on Linux)
fn default_session_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("session.json"),
        |d| d.data_dir().join("earbud-anc").join("session.json"),
    )
}

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Number of configured modes
    pub num_modes: u8,
    /// Mode used when nothing valid was persisted
    pub default_mode: AncMode,
    /// Microphone assignment
    pub microphones: MicConfig,
    /// Filter path layout
    pub path: AncPath,
    /// Adaptive processing available
    pub adaptive: bool,
    /// Voice-call override
    pub call: CallConfig,
    /// Timer durations
    pub timing: TimingConfig,
    /// Session persistence
    pub persist: PersistConfig,
    /// Which ear this device sits in
    pub side: EarSide,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_modes: MAX_MODES,
            default_mode: AncMode::ADAPTIVE,
            microphones: MicConfig {
                feed_forward_left: Some(1),
                feed_forward_right: None,
                feed_back_left: Some(2),
                feed_back_right: None,
            },
            path: AncPath::Hybrid,
            adaptive: true,
            call: CallConfig::default(),
            timing: TimingConfig::default(),
            persist: PersistConfig::default(),
            side: EarSide::Left,
        }
    }
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// An explicit `path` must exist and parse; the standard location falls
    /// back to defaults with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file is unusable or the result is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(p) => file::load_config_from(p)?,
            None => file::load_config_file(),
        };

        let mut config = Self::default();
        config.apply_file(fc);
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values present in the config file
    pub fn apply_file(&mut self, fc: file::AncConfigFile) {
        if let Some(n) = fc.anc.num_modes {
            self.num_modes = n;
        }
        if let Some(m) = fc.anc.default_mode.and_then(AncMode::from_number) {
            self.default_mode = m;
        }
        if let Some(p) = fc.anc.path {
            self.path = p;
        }
        if let Some(a) = fc.anc.adaptive {
            self.adaptive = a;
        }
        if let Some(s) = fc.anc.side {
            self.side = s;
        }

        let mics = fc.microphones;
        if mics.feed_forward_left.is_some()
            || mics.feed_forward_right.is_some()
            || mics.feed_back_left.is_some()
            || mics.feed_back_right.is_some()
        {
            self.microphones = MicConfig {
                feed_forward_left: mics.feed_forward_left,
                feed_forward_right: mics.feed_forward_right,
                feed_back_left: mics.feed_back_left,
                feed_back_right: mics.feed_back_right,
            };
        }

        if let Some(b) = fc.call.implicit_enable {
            self.call.implicit_enable = b;
        }
        if let Some(m) = fc.call.mode.and_then(AncMode::from_number) {
            self.call.mode = m;
        }

        let t = fc.timing;
        let ms = Duration::from_millis;
        self.timing = TimingConfig {
            quiet_mode_delay: t.quiet_mode_delay_ms.map_or(self.timing.quiet_mode_delay, ms),
            gentle_mute: t.gentle_mute_ms.map_or(self.timing.gentle_mute, ms),
            config_settle: t.config_settle_ms.map_or(self.timing.config_settle, ms),
            ff_gain_poll: t.ff_gain_poll_ms.map_or(self.timing.ff_gain_poll, ms),
            path_gain_settle: t.path_gain_settle_ms.map_or(self.timing.path_gain_settle, ms),
        };

        if let Some(b) = fc.persist.enabled {
            self.persist.enabled = b;
        }
        if let Some(b) = fc.persist.mode {
            self.persist.mode = b;
        }
        if let Some(p) = fc.persist.path {
            self.persist.path = PathBuf::from(p);
        }
    }

    /// Overlay `ANCD_*` environment overrides read through `var`
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable value
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(side) = var("ANCD_SIDE") {
            self.side = side.parse()?;
        }
        if let Some(adaptive) = var("ANCD_ADAPTIVE") {
            self.adaptive = parse_bool(&adaptive)
                .ok_or_else(|| Error::Config(format!("invalid ANCD_ADAPTIVE: {adaptive}")))?;
        }
        if let Some(n) = var("ANCD_NUM_MODES") {
            self.num_modes = n
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid ANCD_NUM_MODES: {n}")))?;
        }
        Ok(())
    }

    /// Check invariants between fields
    ///
    /// # Errors
    ///
    /// Returns error describing the first violated constraint
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_MODES).contains(&self.num_modes) {
            return Err(Error::Config(format!(
                "num_modes must be between 1 and {MAX_MODES}, got {}",
                self.num_modes
            )));
        }
        if self.default_mode.index() >= self.num_modes {
            return Err(Error::Config(format!(
                "default {} outside {} configured modes",
                self.default_mode, self.num_modes
            )));
        }
        if self.call.implicit_enable && self.call.mode.index() >= self.num_modes {
            return Err(Error::Config(format!(
                "call {} outside {} configured modes",
                self.call.mode, self.num_modes
            )));
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
