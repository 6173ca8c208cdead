//! Advisory locks shared between processes
//!
//! Every command runs in its own process, next to a long-running `watch`.
//! Two kinds of lock keep them apart:
//! - a domain lock, held for a whole setup, cycle, removal or restart
//!   acknowledgement of one domain;
//! - a file lock, held while `entries.yaml` or `issues.yaml` is re-read,
//!   changed and written back.
//!
//! Both are `flock`-style locks on files under `<data>/locks`, released when
//! the file is closed. Inside one process a domain lock is also a tokio
//! mutex, so waiting tasks do not tie up runtime threads.

use crate::core::path::{ensure_dir, locks_dir};
use crate::core::{TesterError, TesterResult};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Exclusive hold on one domain, across tasks and processes
pub struct DomainGuard {
    _file: File,
    _local: OwnedMutexGuard<()>,
}

/// Domain locks of one data directory
pub struct DomainLocks {
    dir: PathBuf,
    local: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DomainLocks {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: locks_dir(data_dir),
            local: Mutex::new(HashMap::new()),
        }
    }

    fn local(&self, domain: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());
        local
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn path(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("domain-{}.lock", domain))
    }

    /// Wait until `domain` is free, then hold it
    pub async fn lock(&self, domain: &str) -> TesterResult<DomainGuard> {
        let local = self.local(domain).lock_owned().await;
        let path = self.path(domain);
        let file = tokio::task::spawn_blocking(move || lock_file(&path))
            .await
            .map_err(|e| TesterError::Path(format!("Lock task failed: {}", e)))??;

        Ok(DomainGuard {
            _file: file,
            _local: local,
        })
    }

    /// Hold `domain` only if nobody else does
    pub fn try_lock(&self, domain: &str) -> TesterResult<Option<DomainGuard>> {
        let Ok(local) = self.local(domain).try_lock_owned() else {
            return Ok(None);
        };

        let file = open_lock_file(&self.path(domain))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(DomainGuard {
                _file: file,
                _local: local,
            })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Open a lock file and block until it is exclusively held
pub fn lock_file(path: &Path) -> TesterResult<File> {
    let file = open_lock_file(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

fn open_lock_file(path: &Path) -> TesterResult<File> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)?;
    Ok(file)
}
