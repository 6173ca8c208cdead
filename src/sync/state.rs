//! Persisted installation state

use crate::github::types::{CommitInfo, PrState, PullRequestInfo};
use crate::reference::{Resolution, TrackedReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Named operator-visible problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// Several consecutive cycles failed to resolve or install
    DownloadFailed,
    PrMerged,
    PrClosed,
    /// The tracked domain is no longer part of the pull request diff
    IntegrationRemovedFromDiff,
    /// New files are on disk but not active yet
    RestartRequired,
    /// The provider rejected the API token
    TokenInvalid,
}

impl ProblemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemKind::DownloadFailed => "download_failed",
            ProblemKind::PrMerged => "pr_merged",
            ProblemKind::PrClosed => "pr_closed",
            ProblemKind::IntegrationRemovedFromDiff => "integration_removed",
            ProblemKind::RestartRequired => "restart_required",
            ProblemKind::TokenInvalid => "token_invalid",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the last successful cycle saw at the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSeen {
    pub commit: CommitInfo,
    pub last_push_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_state: Option<PrState>,
    /// Title, author, links and branches of a tracked pull request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestInfo>,
    /// Branch the commit came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl LastSeen {
    /// Snapshot of a resolution taken now
    pub fn observed(resolution: &Resolution) -> Self {
        Self {
            commit: resolution.commit.clone(),
            last_push_at: resolution.last_push_at,
            pr_state: resolution.pr_state,
            pull_request: resolution.pull_request.clone(),
            branch: resolution.branch.clone(),
            checked_at: Utc::now(),
        }
    }
}

/// Durable record of one tracked integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    pub entry_id: String,
    /// Unique across all entries
    pub integration_domain: String,
    pub installed_commit_sha: String,
    pub tracked_reference: TrackedReference,
    /// Display name from the manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_name: Option<String>,
    /// Whether the reference targets the core repository (or a fork of it)
    #[serde(default)]
    pub core_repository: bool,
    #[serde(default)]
    pub pending_restart: bool,
    #[serde(default)]
    pub open_problems: BTreeSet<ProblemKind>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<LastSeen>,
    pub installed_at: DateTime<Utc>,
}

impl InstallationState {
    /// State for a fresh install; the new files still need a restart
    pub fn new(
        domain: impl Into<String>,
        commit_sha: impl Into<String>,
        tracked_reference: TrackedReference,
        core_repository: bool,
    ) -> Self {
        let domain = domain.into();
        let now = Utc::now();
        Self {
            entry_id: format!("{}-{}", domain, now.timestamp_millis()),
            integration_domain: domain,
            installed_commit_sha: commit_sha.into(),
            tracked_reference,
            integration_name: None,
            core_repository,
            pending_restart: true,
            open_problems: BTreeSet::from([ProblemKind::RestartRequired]),
            consecutive_failures: 0,
            last_seen: None,
            installed_at: now,
        }
    }

    pub fn has_problem(&self, kind: ProblemKind) -> bool {
        self.open_problems.contains(&kind)
    }

    pub fn short_sha(&self) -> &str {
        crate::github::types::short_sha(&self.installed_commit_sha)
    }

    /// Web page of the branch the installed commit came from
    pub fn branch_url(&self) -> Option<String> {
        let seen = self.last_seen.as_ref()?;
        let branch = seen.branch.as_ref()?;
        // A pull request from a fork lives in the fork's repository
        let repository = seen
            .pull_request
            .as_ref()
            .and_then(|pr| pr.source_repo_url.clone())
            .unwrap_or_else(|| format!("https://github.com/{}", self.tracked_reference.full_name()));
        Some(format!("{}/tree/{}", repository.trim_end_matches('/'), branch))
    }
}
