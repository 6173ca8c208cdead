//! Trait definitions for dependency injection

use crate::core::TesterResult;
use crate::github::types::{BranchTip, CommitInfo, DirEntry, PullRequestInfo, RepoInfo};
use crate::install::marker::Marker;
use crate::install::InstallRequest;
use crate::problems::Problem;
use crate::sync::state::ProblemKind;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trait for configuration access
///
/// Provides read-only access to application configuration.
/// Implementations should be thread-safe (Send + Sync).
pub trait ConfigProvider: Send + Sync {
    /// Get the GitHub API base URL
    fn api_url(&self) -> &str;

    /// Interval between scheduled checks of one entry
    fn poll_interval(&self) -> Duration;

    /// Upper bound for a single provider request
    fn request_timeout(&self) -> Duration;

    /// Consecutive failed cycles before `DownloadFailed` is raised
    fn failure_threshold(&self) -> u32;

    /// `owner/repo` of the core repository
    fn core_repository(&self) -> &str;

    /// Integration directory inside the core repository
    fn core_components_path(&self) -> &str;

    /// Integration directory inside custom repositories
    fn custom_components_path(&self) -> &str;

    /// Directory integrations are installed into
    fn install_dir(&self) -> PathBuf;

    /// Directory holding persisted entries and problems
    fn data_dir(&self) -> TesterResult<PathBuf>;
}

/// Trait for the archive cache
pub trait CacheProvider: Send + Sync {
    /// Get the cache path for the archive of a commit
    fn archive_path(&self, owner: &str, repo: &str, sha: &str) -> PathBuf;

    /// Check if a file exists in the cache
    fn exists(&self, path: &Path) -> bool;

    /// Write a file to the cache
    fn write(&self, path: &Path, data: &[u8]) -> TesterResult<()>;

    /// Drop a file from the cache
    fn remove(&self, path: &Path) -> TesterResult<()>;
}

/// Read-only access to the hosting service
///
/// Every call may fail with a rate-limit, timeout or transient network error.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Repository metadata (default branch, fork parent)
    async fn get_repository(&self, owner: &str, repo: &str) -> TesterResult<RepoInfo>;

    /// Tip commit of a branch
    async fn get_branch_tip(&self, owner: &str, repo: &str, branch: &str)
        -> TesterResult<BranchTip>;

    /// Pull request metadata, including state and head commit
    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> TesterResult<PullRequestInfo>;

    /// Commit metadata
    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> TesterResult<CommitInfo>;

    /// Paths changed by a pull request
    async fn get_pr_diff(&self, owner: &str, repo: &str, number: u64)
        -> TesterResult<BTreeSet<String>>;

    /// Directory listing at a ref
    async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_: &str,
    ) -> TesterResult<Vec<DirEntry>>;

    /// File content at a ref
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_: &str,
    ) -> TesterResult<String>;

    /// Download the source archive of a commit, returning its local path
    async fn download_archive(&self, owner: &str, repo: &str, sha: &str) -> TesterResult<PathBuf>;
}

/// Filesystem installer for integration directories
///
/// Implementations must never leave a half-written directory at the install
/// location and must refuse to replace a directory that lacks a marker unless
/// the request says otherwise.
pub trait IntegrationInstaller: Send + Sync {
    /// Install the integration described by `request` from a downloaded archive
    fn install(&self, request: &InstallRequest, archive: &Path) -> TesterResult<PathBuf>;

    /// Read the marker of an installed integration, if any
    fn read_marker(&self, domain: &str) -> TesterResult<Option<Marker>>;

    /// Check whether anything exists at the install location of `domain`
    fn exists(&self, domain: &str) -> bool;

    /// Remove an installed integration
    ///
    /// With `keep_files` the directory stays in place and only the marker is
    /// removed.
    fn uninstall(&self, domain: &str, keep_files: bool) -> TesterResult<()>;

    /// Domains with scratch or backup directories left by an install
    fn interrupted(&self) -> TesterResult<Vec<String>>;

    /// Roll back an interrupted swap of `domain` and drop its scratch
    /// directories, returning whether the previous tree was restored
    ///
    /// Callers must hold the domain lock; a running install owns the same
    /// directories.
    fn recover(&self, domain: &str) -> TesterResult<bool>;

    /// Markers of every managed directory in the install location
    fn managed_markers(&self) -> TesterResult<Vec<Marker>>;
}

/// Sink for operator-visible problems
///
/// `raise` and `clear` are idempotent.
#[cfg_attr(test, mockall::automock)]
pub trait ProblemSink: Send + Sync {
    /// Raise a problem for a domain
    fn raise(&self, kind: ProblemKind, domain: &str, context: &str) -> TesterResult<()>;

    /// Clear a problem for a domain
    fn clear(&self, kind: ProblemKind, domain: &str) -> TesterResult<()>;

    /// Clear every problem of a domain
    fn clear_all(&self, domain: &str) -> TesterResult<()>;

    /// Every open problem
    fn list(&self) -> TesterResult<Vec<Problem>>;
}
