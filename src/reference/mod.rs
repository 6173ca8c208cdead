//! Tracked references and their resolution
//!
//! Data flows one way per cycle: a URL is classified into a
//! [`TrackedReference`], resolved against the source provider into a
//! [`resolver::Resolution`], and discovery attaches the candidate domains to
//! form a [`ResolvedTarget`].

pub mod classifier;
pub mod discovery;
pub mod resolver;

pub use classifier::classify;
pub use discovery::{discover, domains_from_diff, integration_name, is_core_repository};
pub use resolver::{resolve, Resolution};

use crate::core::{TesterError, TesterResult};
use crate::github::types::PrState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What the user asked to track on a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "locator", rename_all = "snake_case")]
pub enum ReferenceKind {
    DefaultBranch,
    Branch(String),
    PullRequest(u64),
    /// Lowercase commit hash
    Commit(String),
}

/// Immutable descriptor of a tracked repository reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedReference {
    pub owner: String,
    pub repo: String,
    pub kind: ReferenceKind,
}

impl TrackedReference {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, kind: ReferenceKind) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            kind,
        }
    }

    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Whether `owner/repo` matches, ignoring case
    pub fn same_repository(&self, other: &TrackedReference) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner) && self.repo.eq_ignore_ascii_case(&other.repo)
    }

    /// Canonical GitHub URL, accepted back by [`classify`]
    pub fn to_url(&self) -> String {
        let base = format!("https://github.com/{}/{}", self.owner, self.repo);
        match &self.kind {
            ReferenceKind::DefaultBranch => base,
            ReferenceKind::Branch(name) => format!("{}/tree/{}", base, name),
            ReferenceKind::PullRequest(number) => format!("{}/pull/{}", base, number),
            ReferenceKind::Commit(sha) => format!("{}/commit/{}", base, sha),
        }
    }

    /// Commits never move, so polling them is pointless
    pub fn is_polled(&self) -> bool {
        !matches!(self.kind, ReferenceKind::Commit(_))
    }
}

impl fmt::Display for TrackedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ReferenceKind::DefaultBranch => write!(f, "{}/{} (default branch)", self.owner, self.repo),
            ReferenceKind::Branch(name) => write!(f, "{}/{}@{}", self.owner, self.repo, name),
            ReferenceKind::PullRequest(number) => write!(f, "{}/{}#{}", self.owner, self.repo, number),
            ReferenceKind::Commit(sha) => write!(
                f,
                "{}/{}@{}",
                self.owner,
                self.repo,
                crate::github::types::short_sha(sha)
            ),
        }
    }
}

/// The remote state of a tracked reference plus the domains found in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub resolution: Resolution,
    pub candidate_domains: BTreeSet<String>,
}

impl ResolvedTarget {
    /// Build a target for setup, where an empty domain set is an error
    pub fn new(resolution: Resolution, candidate_domains: BTreeSet<String>) -> TesterResult<Self> {
        if candidate_domains.is_empty() {
            return Err(TesterError::NoIntegrationInDiff(format!(
                "no integration found at {}",
                resolution.commit.short_sha()
            )));
        }
        Ok(Self {
            resolution,
            candidate_domains,
        })
    }

    /// Build a target during a sync cycle
    ///
    /// The set may be empty when a core pull request no longer touches any
    /// integration; the state machine reports that as a removal.
    pub fn for_cycle(resolution: Resolution, candidate_domains: BTreeSet<String>) -> Self {
        Self {
            resolution,
            candidate_domains,
        }
    }

    pub fn commit_sha(&self) -> &str {
        &self.resolution.commit_sha
    }

    pub fn pr_state(&self) -> Option<PrState> {
        self.resolution.pr_state
    }
}
