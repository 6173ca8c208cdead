//! Ownership marker stamped into every installed directory

use crate::core::TesterResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Marker file name inside an installed integration
pub const MARKER_FILE: &str = ".integration_tester";

/// Durable proof that a directory is managed, and what was installed into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub domain: String,
    pub commit_sha: String,
    pub tracked_url: String,
    #[serde(default)]
    pub core_repository: bool,
    pub installed_at: DateTime<Utc>,
}

impl Marker {
    /// Write the marker into `dir`
    pub fn write(&self, dir: &Path) -> TesterResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(MARKER_FILE), content)?;
        Ok(())
    }

    /// Read the marker of `dir`; `None` when the directory is not managed
    pub fn read(dir: &Path) -> TesterResult<Option<Self>> {
        let path = dir.join(MARKER_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Remove the marker from `dir`, leaving the directory unmanaged
    pub fn remove(dir: &Path) -> TesterResult<()> {
        let path = dir.join(MARKER_FILE);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
