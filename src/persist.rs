//! Session persistence
//!
//! Only two values survive a power cycle: whether ANC was requested on and
//! which mode was requested. They are written when the manager powers off,
//! not on every change.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anc::AncMode;
use crate::{Error, Result};

/// Values persisted across power cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// ANC was requested on at power-off
    pub enabled: bool,
    /// Mode requested at power-off
    pub mode: AncMode,
}

/// Storage for [`SessionData`]
pub trait SessionStore: Send {
    /// Load the last saved session, `None` if nothing was saved yet
    ///
    /// # Errors
    ///
    /// Returns error if stored data exists but cannot be read
    fn load(&mut self) -> Result<Option<SessionData>>;

    /// Save the session
    ///
    /// # Errors
    ///
    /// Returns error if the data cannot be written
    fn save(&mut self, data: &SessionData) -> Result<()>;
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&mut self) -> Result<Option<SessionData>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let data = serde_json::from_str(&content)?;
        tracing::debug!(path = %self.path.display(), ?data, "loaded session data");
        Ok(Some(data))
    }

    fn save(&mut self, data: &SessionData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(path = %self.path.display(), ?data, "saved session data");
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    data: Option<SessionData>,
    saves: usize,
}

impl MemorySessionStore {
    /// Store pre-loaded with `data`
    #[must_use]
    pub const fn with_data(data: SessionData) -> Self {
        Self {
            data: Some(data),
            saves: 0,
        }
    }

    /// Last saved or pre-loaded data
    #[must_use]
    pub const fn data(&self) -> Option<SessionData> {
        self.data
    }

    /// Number of saves performed
    #[must_use]
    pub const fn saves(&self) -> usize {
        self.saves
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&mut self) -> Result<Option<SessionData>> {
        Ok(self.data)
    }

    fn save(&mut self, data: &SessionData) -> Result<()> {
        self.data = Some(*data);
        self.saves += 1;
        Ok(())
    }
}
