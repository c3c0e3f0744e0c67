//! TOML configuration file loading
//!
//! Supports `~/.config/earbud-anc/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{AncPath, EarSide};
use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AncConfigFile {
    /// ANC hardware and mode configuration
    #[serde(default)]
    pub anc: AncFileConfig,

    /// Microphone assignment
    #[serde(default)]
    pub microphones: MicFileConfig,

    /// Voice-call override
    #[serde(default)]
    pub call: CallFileConfig,

    /// Timer durations
    #[serde(default)]
    pub timing: TimingFileConfig,

    /// Session persistence
    #[serde(default)]
    pub persist: PersistFileConfig,
}

/// ANC configuration
#[derive(Debug, Default, Deserialize)]
pub struct AncFileConfig {
    /// Number of configured modes (1-10)
    pub num_modes: Option<u8>,

    /// Mode used when nothing was persisted (1-based)
    pub default_mode: Option<u8>,

    /// Filter path layout (e.g. "hybrid", "feed_forward_left_only")
    pub path: Option<AncPath>,

    /// Adaptive processing available
    pub adaptive: Option<bool>,

    /// Which ear this device sits in ("left" or "right")
    pub side: Option<EarSide>,
}

/// Microphone numbers; absent means not fitted
#[derive(Debug, Default, Deserialize)]
pub struct MicFileConfig {
    pub feed_forward_left: Option<u8>,
    pub feed_forward_right: Option<u8>,
    pub feed_back_left: Option<u8>,
    pub feed_back_right: Option<u8>,
}

/// Voice-call override configuration
#[derive(Debug, Default, Deserialize)]
pub struct CallFileConfig {
    /// Force ANC on during calls
    pub implicit_enable: Option<bool>,

    /// Mode forced during calls (1-based)
    pub mode: Option<u8>,
}

/// Timer durations in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct TimingFileConfig {
    pub quiet_mode_delay_ms: Option<u64>,
    pub gentle_mute_ms: Option<u64>,
    pub config_settle_ms: Option<u64>,
    pub ff_gain_poll_ms: Option<u64>,
    pub path_gain_settle_ms: Option<u64>,
}

/// Session persistence configuration
#[derive(Debug, Default, Deserialize)]
pub struct PersistFileConfig {
    /// Persist the enabled state across power cycles
    pub enabled: Option<bool>,

    /// Persist the mode across power cycles
    pub mode: Option<bool>,

    /// Session file location
    pub path: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AncConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> AncConfigFile {
    let Some(path) = config_file_path() else {
        return AncConfigFile::default();
    };

    if !path.exists() {
        return AncConfigFile::default();
    }

    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            AncConfigFile::default()
        }
    }
}

/// Load a TOML config file from an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_from(path: &Path) -> Result<AncConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/earbud-anc/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("earbud-anc").join("config.toml"))
}
