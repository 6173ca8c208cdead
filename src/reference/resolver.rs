//! Resolution of tracked references against the source provider

use super::{ReferenceKind, TrackedReference};
use crate::core::TesterResult;
use crate::di::traits::SourceProvider;
use crate::github::types::{CommitInfo, PrState, PullRequestInfo};
use chrono::{DateTime, Utc};

/// Concrete remote state of a tracked reference, as of one resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Full, lowercase commit hash the reference points to
    pub commit_sha: String,
    pub commit: CommitInfo,
    /// Most recent push relevant to the reference
    pub last_push_at: DateTime<Utc>,
    /// Only set for pull requests
    pub pr_state: Option<PrState>,
    pub pull_request: Option<PullRequestInfo>,
    /// Branch the commit was taken from, when there is one
    pub branch: Option<String>,
}

/// Resolve a tracked reference to a concrete commit
///
/// Provider errors propagate unchanged; the caller decides whether they count
/// as a failed cycle.
pub async fn resolve(
    source: &dyn SourceProvider,
    reference: &TrackedReference,
) -> TesterResult<Resolution> {
    let (owner, repo) = (reference.owner.as_str(), reference.repo.as_str());

    match &reference.kind {
        ReferenceKind::DefaultBranch => {
            let info = source.get_repository(owner, repo).await?;
            resolve_branch(source, owner, repo, &info.default_branch).await
        }
        ReferenceKind::Branch(name) => resolve_branch(source, owner, repo, name).await,
        ReferenceKind::PullRequest(number) => {
            let pr = source.get_pull_request(owner, repo, *number).await?;
            let commit = source.get_commit(owner, repo, &pr.head_sha).await?;
            tracing::debug!(
                "Resolved {}/{}#{} to {} ({})",
                owner,
                repo,
                number,
                commit.short_sha(),
                pr.state
            );
            Ok(Resolution {
                commit_sha: pr.head_sha.to_lowercase(),
                last_push_at: pr.pushed_at.unwrap_or(commit.committed_at),
                pr_state: Some(pr.state),
                branch: Some(pr.head_ref.clone()),
                pull_request: Some(pr),
                commit,
            })
        }
        ReferenceKind::Commit(sha) => {
            let commit = source.get_commit(owner, repo, sha).await?;
            Ok(Resolution {
                commit_sha: commit.sha.to_lowercase(),
                last_push_at: commit.committed_at,
                pr_state: None,
                pull_request: None,
                branch: None,
                commit,
            })
        }
    }
}

async fn resolve_branch(
    source: &dyn SourceProvider,
    owner: &str,
    repo: &str,
    branch: &str,
) -> TesterResult<Resolution> {
    let tip = source.get_branch_tip(owner, repo, branch).await?;
    tracing::debug!("Resolved {}/{}@{} to {}", owner, repo, branch, tip.commit.short_sha());
    Ok(Resolution {
        commit_sha: tip.sha.to_lowercase(),
        last_push_at: tip.pushed_at,
        pr_state: None,
        pull_request: None,
        branch: Some(tip.name),
        commit: tip.commit,
    })
}
