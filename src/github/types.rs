//! GitHub API type definitions
//!
//! `Api*` structs mirror the REST payloads; the remaining types are the
//! trimmed-down views handed to the rest of the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a pull request
///
/// GitHub reports `closed` for merged pull requests too; the `merged` flag
/// takes precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    pub fn from_api(state: &str, merged: bool) -> Self {
        if merged {
            PrState::Merged
        } else if state.eq_ignore_ascii_case("closed") {
            PrState::Closed
        } else {
            PrState::Open
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
            PrState::Merged => write!(f, "merged"),
        }
    }
}

/// Repository metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub full_name: String,
    pub default_branch: String,
    pub fork: bool,
    /// `owner/repo` of the fork parent, if this repository is a fork
    pub parent_full_name: Option<String>,
}

/// Commit metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    /// First line of the commit message
    pub message: String,
    pub author: String,
    pub committed_at: DateTime<Utc>,
    pub html_url: String,
}

impl CommitInfo {
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }
}

/// Seven-character abbreviation used in titles and logs
pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Tip of a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTip {
    pub name: String,
    pub sha: String,
    pub commit: CommitInfo,
    pub pushed_at: DateTime<Utc>,
}

/// Pull request metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub state: PrState,
    pub author: String,
    pub head_sha: String,
    pub head_ref: String,
    pub base_ref: String,
    /// Set only when the pull request comes from a fork
    pub source_repo_url: Option<String>,
    pub html_url: String,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Kind of a repository directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// A single entry of a repository directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// GitHub API rate limit information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateLimitResponse {
    pub resources: ApiRateLimitResources,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateLimitResources {
    pub core: RateLimit,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRepository {
    pub full_name: String,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub fork: bool,
    pub parent: Option<ApiRepoRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRepoRef {
    pub full_name: String,
    pub html_url: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiBranch {
    pub name: String,
    pub commit: ApiCommit,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommit {
    pub sha: String,
    pub html_url: Option<String>,
    pub commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommitDetail {
    pub message: Option<String>,
    pub author: Option<ApiSignature>,
    pub committer: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiSignature {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl ApiCommit {
    pub(crate) fn into_info(self) -> CommitInfo {
        let author = self.commit.author.as_ref();
        let committed_at = self
            .commit
            .committer
            .as_ref()
            .and_then(|c| c.date)
            .or_else(|| author.and_then(|a| a.date))
            .unwrap_or_default();
        CommitInfo {
            message: self
                .commit
                .message
                .as_deref()
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
            author: author
                .and_then(|a| a.name.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            committed_at,
            html_url: self.html_url.unwrap_or_default(),
            sha: self.sha,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPullRequest {
    pub number: u64,
    pub title: Option<String>,
    pub state: String,
    #[serde(default)]
    pub merged: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
    pub user: Option<ApiUser>,
    pub head: ApiPrRef,
    pub base: ApiPrRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPrRef {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub repo: Option<ApiRepoRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub login: String,
}

impl ApiPullRequest {
    pub(crate) fn into_info(self) -> PullRequestInfo {
        let head_repo = self.head.repo.as_ref();
        let base_repo = self.base.repo.as_ref();
        let from_fork = match (head_repo, base_repo) {
            (Some(h), Some(b)) => h.full_name != b.full_name,
            _ => false,
        };
        PullRequestInfo {
            number: self.number,
            title: self.title.unwrap_or_default(),
            state: PrState::from_api(&self.state, self.merged || self.merged_at.is_some()),
            author: self
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "unknown".to_string()),
            source_repo_url: if from_fork {
                head_repo.and_then(|r| r.html_url.clone())
            } else {
                None
            },
            pushed_at: head_repo.and_then(|r| r.pushed_at),
            head_sha: self.head.sha,
            head_ref: self.head.ref_name,
            base_ref: self.base.ref_name,
            html_url: self.html_url.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPrFile {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiFileContent {
    pub content: String,
    pub encoding: String,
}
