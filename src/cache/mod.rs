use crate::core::path::{cache_dir, ensure_dir};
use crate::core::{TesterError, TesterResult};
use crate::di::traits::CacheProvider;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Archive cache manager
///
/// Archives are keyed by `owner/repo/<sha>.tar.gz`; a commit's archive never
/// changes, so a cached file is always valid.
#[derive(Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Create a new cache instance
    pub fn new(cache_root: PathBuf) -> TesterResult<Self> {
        ensure_dir(&cache_root)?;
        Ok(Self { root: cache_root })
    }

    /// Get the default cache directory
    pub fn default_cache() -> TesterResult<Self> {
        Self::new(cache_dir()?)
    }

    /// Get the archives cache directory
    pub fn archives_dir(&self) -> PathBuf {
        self.root.join("archives")
    }

    /// Get the cached path for the archive of a commit
    pub fn archive_path(&self, owner: &str, repo: &str, sha: &str) -> PathBuf {
        self.archives_dir()
            .join(owner.to_lowercase())
            .join(repo.to_lowercase())
            .join(format!("{}.tar.gz", sha))
    }

    /// Write a file to cache
    ///
    /// Data goes to a temporary sibling first, so a crash never leaves a
    /// truncated archive under the final name.
    pub fn write(&self, path: &Path, data: &[u8]) -> TesterResult<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let tmp = path.with_extension(format!("part.{}", std::process::id()));
        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(data)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, path));

        written.map_err(|e| {
            let _ = fs::remove_file(&tmp);
            TesterError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write to cache: {}: {}", path.display(), e),
            ))
        })
    }

    /// Remove a file from cache
    pub fn remove(&self, path: &Path) -> TesterResult<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl CacheProvider for Cache {
    fn archive_path(&self, owner: &str, repo: &str, sha: &str) -> PathBuf {
        Cache::archive_path(self, owner, repo, sha)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn write(&self, path: &Path, data: &[u8]) -> TesterResult<()> {
        Cache::write(self, path, data)
    }

    fn remove(&self, path: &Path) -> TesterResult<()> {
        Cache::remove(self, path)
    }
}
