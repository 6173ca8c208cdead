//! Persisted installation entries
//!
//! Several processes share one data directory, so nothing is cached: every
//! read goes to disk and every change re-reads the file under a file lock
//! before writing it back.

pub mod lock;

pub use lock::{DomainGuard, DomainLocks};

use crate::core::path::{ensure_dir, entries_file, locks_dir};
use crate::core::{TesterError, TesterResult};
use crate::sync::state::InstallationState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// YAML-backed map of domain to [`InstallationState`]
///
/// Every mutation rewrites the file through a temporary sibling and a rename.
pub struct StateStore {
    data_dir: PathBuf,
    path: PathBuf,
    lock_path: PathBuf,
}

impl StateStore {
    /// Open the store in `data_dir`
    pub fn open(data_dir: &Path) -> TesterResult<Self> {
        ensure_dir(data_dir)?;
        let store = Self {
            data_dir: data_dir.to_path_buf(),
            path: entries_file(data_dir),
            lock_path: locks_dir(data_dir).join("entries.lock"),
        };
        // Surface a corrupt file now rather than on the first cycle
        store.read()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory shared with every other process using this store
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn get(&self, domain: &str) -> TesterResult<Option<InstallationState>> {
        Ok(self.read()?.remove(domain))
    }

    pub fn all(&self) -> TesterResult<Vec<InstallationState>> {
        Ok(self.read()?.into_values().collect())
    }

    pub fn domains(&self) -> TesterResult<Vec<String>> {
        Ok(self.read()?.into_keys().collect())
    }

    /// Insert or replace the entry of `state.integration_domain`
    pub fn upsert(&self, state: InstallationState) -> TesterResult<()> {
        self.update(|entries| {
            entries.insert(state.integration_domain.clone(), state);
            Ok(())
        })
    }

    /// Remove and return the entry of `domain`
    pub fn remove(&self, domain: &str) -> TesterResult<InstallationState> {
        self.update(|entries| {
            entries
                .remove(domain)
                .ok_or_else(|| TesterError::NotTracked(domain.to_string()))
        })
    }

    fn read(&self) -> TesterResult<BTreeMap<String, InstallationState>> {
        read_yaml(&self.path)
    }

    /// Re-read, change and write back the entries under the file lock
    ///
    /// Nothing is written when `change` fails.
    fn update<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, InstallationState>) -> TesterResult<T>,
    ) -> TesterResult<T> {
        let _lock = lock::lock_file(&self.lock_path)?;
        let mut entries = self.read()?;
        let result = change(&mut entries)?;
        write_yaml(&self.path, &entries)?;
        Ok(result)
    }
}

/// Read a YAML file; a missing or empty file is the default value
pub fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> TesterResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_yaml::from_str(&content)?)
}

/// Serialize to YAML and write atomically
pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> TesterResult<()> {
    let content = serde_yaml::to_string(value)?;
    write_atomic(path, content.as_bytes())
}

/// Write a file through a temporary sibling and a rename
pub fn write_atomic(path: &Path, data: &[u8]) -> TesterResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
