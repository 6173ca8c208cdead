//! Atomic filesystem installer
//!
//! Layout next to an installed `<install_dir>/<domain>`:
//! - `.<domain>.extract`: scratch space for the unpacked archive
//! - `.<domain>.staging`: the complete new tree, marker included
//! - `.<domain>.backup`: the previous tree while the swap is in progress
//!
//! The live directory only ever changes by `rename`, so a reader sees either
//! the old or the new tree. A crash between the two renames leaves a backup
//! that `recover` puts back.

use super::extractor::ArchiveExtractor;
use super::marker::Marker;
use super::InstallRequest;
use crate::core::path::{ensure_dir, sibling_path};
use crate::core::{TesterError, TesterResult};
use crate::di::traits::IntegrationInstaller;
use crate::reference::discovery::MANIFEST_FILE;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXTRACT_SUFFIX: &str = "extract";
const STAGING_SUFFIX: &str = "staging";
const BACKUP_SUFFIX: &str = "backup";

/// Installs integrations below a single directory
#[derive(Debug, Clone)]
pub struct FsInstaller {
    install_dir: PathBuf,
}

impl FsInstaller {
    pub fn new(install_dir: PathBuf) -> Self {
        Self { install_dir }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    fn target(&self, domain: &str) -> PathBuf {
        self.install_dir.join(domain)
    }

    fn stage(&self, request: &InstallRequest, archive: &Path, target: &Path) -> TesterResult<PathBuf> {
        let extractor = ArchiveExtractor::new(sibling_path(target, EXTRACT_SUFFIX));
        let root = extractor.extract(archive)?;
        let result = self.build_staging(request, &root, target);
        extractor.cleanup();
        result
    }

    fn build_staging(
        &self,
        request: &InstallRequest,
        root: &Path,
        target: &Path,
    ) -> TesterResult<PathBuf> {
        let source = root.join(&request.source_path);
        if !source.join(MANIFEST_FILE).is_file() {
            return Err(TesterError::ManifestNotFound(format!(
                "{}/{} is missing from commit {}",
                request.source_path, MANIFEST_FILE, request.commit_sha
            )));
        }

        let staging = sibling_path(target, STAGING_SUFFIX);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        copy_dir(&source, &staging)?;

        Marker {
            domain: request.domain.clone(),
            commit_sha: request.commit_sha.clone(),
            tracked_url: request.tracked_url.clone(),
            core_repository: request.core_repository,
            installed_at: Utc::now(),
        }
        .write(&staging)?;

        Ok(staging)
    }

    fn swap(&self, staging: &Path, target: &Path) -> TesterResult<()> {
        let backup = sibling_path(target, BACKUP_SUFFIX);
        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }

        let had_previous = target.exists();
        if had_previous {
            fs::rename(target, &backup)?;
        }

        if let Err(e) = fs::rename(staging, target) {
            if had_previous {
                let _ = fs::rename(&backup, target);
            }
            let _ = fs::remove_dir_all(staging);
            return Err(TesterError::Install(format!(
                "Failed to move {} into place: {}",
                target.display(),
                e
            )));
        }

        if had_previous {
            fs::remove_dir_all(&backup)?;
        }
        Ok(())
    }
}

impl IntegrationInstaller for FsInstaller {
    fn install(&self, request: &InstallRequest, archive: &Path) -> TesterResult<PathBuf> {
        ensure_dir(&self.install_dir)?;
        let target = self.target(&request.domain);

        if target.exists() && Marker::read(&target)?.is_none() && !request.overwrite {
            return Err(TesterError::UnmanagedDirectory(request.domain.clone()));
        }

        let staging = self.stage(request, archive, &target)?;
        self.swap(&staging, &target)?;

        tracing::info!(
            "Installed {} at {} into {}",
            request.domain,
            request.commit_sha,
            target.display()
        );
        Ok(target)
    }

    fn read_marker(&self, domain: &str) -> TesterResult<Option<Marker>> {
        let target = self.target(domain);
        if !target.is_dir() {
            return Ok(None);
        }
        Marker::read(&target)
    }

    fn exists(&self, domain: &str) -> bool {
        self.target(domain).exists()
    }

    fn uninstall(&self, domain: &str, keep_files: bool) -> TesterResult<()> {
        let target = self.target(domain);
        if !target.exists() {
            return Ok(());
        }

        if Marker::read(&target)?.is_none() {
            tracing::warn!(
                "{} has no marker, leaving it in place",
                target.display()
            );
            return Ok(());
        }

        if keep_files {
            Marker::remove(&target)?;
        } else {
            fs::remove_dir_all(&target)?;
        }
        Ok(())
    }

    fn interrupted(&self) -> TesterResult<Vec<String>> {
        let mut domains = Vec::new();
        if !self.install_dir.is_dir() {
            return Ok(domains);
        }

        for entry in fs::read_dir(&self.install_dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some((domain, _)) = leftover(name) {
                domains.push(domain.to_string());
            }
        }

        domains.sort();
        domains.dedup();
        Ok(domains)
    }

    fn recover(&self, domain: &str) -> TesterResult<bool> {
        let target = self.target(domain);

        let backup = sibling_path(&target, BACKUP_SUFFIX);
        let mut restored = false;
        if backup.exists() {
            if target.exists() {
                fs::remove_dir_all(&backup)?;
            } else {
                fs::rename(&backup, &target)?;
                tracing::warn!("Restored {} from an interrupted install", domain);
                restored = true;
            }
        }

        for suffix in [STAGING_SUFFIX, EXTRACT_SUFFIX] {
            let scratch = sibling_path(&target, suffix);
            if scratch.exists() {
                fs::remove_dir_all(&scratch)?;
            }
        }
        Ok(restored)
    }

    fn managed_markers(&self) -> TesterResult<Vec<Marker>> {
        let mut markers = Vec::new();
        if !self.install_dir.is_dir() {
            return Ok(markers);
        }

        for entry in fs::read_dir(&self.install_dir)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden || !path.is_dir() {
                continue;
            }
            match Marker::read(&path) {
                Ok(Some(marker)) => markers.push(marker),
                Ok(None) => {}
                Err(e) => tracing::warn!("Ignoring marker in {}: {}", path.display(), e),
            }
        }

        markers.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(markers)
    }
}

/// Split `.<domain>.<suffix>` names left behind by an install
fn leftover(name: &str) -> Option<(&str, &str)> {
    let (domain, suffix) = name.strip_prefix('.')?.rsplit_once('.')?;
    matches!(suffix, EXTRACT_SUFFIX | STAGING_SUFFIX | BACKUP_SUFFIX).then_some((domain, suffix))
}

/// Copy a directory tree
fn copy_dir(src: &Path, dst: &Path) -> TesterResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| TesterError::Path(e.to_string()))?;
        let destination = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}
