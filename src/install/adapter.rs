//! Carries out state machine decisions
//!
//! The adapter is the only side-effecting collaborator of the state machine:
//! it downloads archives, calls the filesystem installer and forwards problem
//! transitions to the sink. An install that fails leaves the prior commit in
//! place and is counted as a failed cycle; the rest of the decision stands.

use super::InstallRequest;
use crate::core::{TesterError, TesterResult};
use crate::di::traits::{CacheProvider, ConfigProvider, IntegrationInstaller, ProblemSink, SourceProvider};
use crate::reference::discovery::integration_path;
use crate::reference::{ResolvedTarget, TrackedReference};
use crate::sync::machine::{fold_install_failure, Action, CycleFailure, Decision};
use crate::sync::state::InstallationState;
use std::path::PathBuf;
use std::sync::Arc;

/// Executes installs and problem transitions
#[derive(Clone)]
pub struct InstallerAdapter {
    config: Arc<dyn ConfigProvider>,
    source: Arc<dyn SourceProvider>,
    installer: Arc<dyn IntegrationInstaller>,
    cache: Arc<dyn CacheProvider>,
    problems: Arc<dyn ProblemSink>,
}

impl InstallerAdapter {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        source: Arc<dyn SourceProvider>,
        installer: Arc<dyn IntegrationInstaller>,
        cache: Arc<dyn CacheProvider>,
        problems: Arc<dyn ProblemSink>,
    ) -> Self {
        Self {
            config,
            source,
            installer,
            cache,
            problems,
        }
    }

    /// Download and install one domain of a resolved target
    pub async fn install(
        &self,
        reference: &TrackedReference,
        target: &ResolvedTarget,
        domain: &str,
        core: bool,
        overwrite: bool,
    ) -> TesterResult<PathBuf> {
        let archive = self
            .source
            .download_archive(&reference.owner, &reference.repo, target.commit_sha())
            .await?;

        let request = InstallRequest {
            domain: domain.to_string(),
            commit_sha: target.commit_sha().to_string(),
            source_path: integration_path(self.config.as_ref(), core, domain),
            tracked_url: reference.to_url(),
            core_repository: core,
            overwrite,
        };

        let installer = self.installer.clone();
        let archive_path = archive.clone();
        let installed = tokio::task::spawn_blocking(move || installer.install(&request, &archive_path))
            .await
            .map_err(|e| TesterError::Install(format!("Install task failed: {}", e)))??;

        if let Err(e) = self.cache.remove(&archive) {
            tracing::debug!("Could not drop cached archive {}: {}", archive.display(), e);
        }
        Ok(installed)
    }

    /// Apply a decision, returning the state to persist
    pub async fn apply(
        &self,
        prior: &InstallationState,
        decision: Decision,
    ) -> TesterResult<InstallationState> {
        if let Some(target) = decision.install_target().cloned() {
            let installed = self
                .install(
                    &prior.tracked_reference,
                    &target,
                    &prior.integration_domain,
                    prior.core_repository,
                    false,
                )
                .await;

            if let Err(e) = installed {
                tracing::warn!("{}: install failed: {}", prior.integration_domain, e);
                let failed = fold_install_failure(
                    prior,
                    decision,
                    &CycleFailure::from(&e),
                    self.config.failure_threshold(),
                );
                self.report(&prior.integration_domain, &failed.actions)?;
                return Ok(failed.next);
            }
        }

        self.report(&prior.integration_domain, &decision.actions)?;
        Ok(decision.next)
    }

    /// Forward problem transitions to the sink
    pub fn report(&self, domain: &str, actions: &[Action]) -> TesterResult<()> {
        for action in actions {
            match action {
                Action::RaiseProblem(kind, context) => {
                    tracing::info!("{}: raising {}", domain, kind);
                    self.problems.raise(*kind, domain, context)?;
                }
                Action::ClearProblem(kind) => {
                    tracing::info!("{}: clearing {}", domain, kind);
                    self.problems.clear(*kind, domain)?;
                }
                Action::NoOp | Action::Install(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::mocks::{
        MemoryProblemSink, MockCacheProvider, MockConfigProvider, MockInstaller, MockSourceProvider,
    };
    use crate::di::traits::MockProblemSink;
    use crate::github::types::{CommitInfo, PrState};
    use crate::reference::{ReferenceKind, Resolution};
    use crate::sync::machine::{decide, CycleInput};
    use crate::sync::state::ProblemKind;
    use chrono::Utc;
    use std::collections::BTreeSet;

    const C1: &str = "1111111111111111111111111111111111111111";
    const C2: &str = "2222222222222222222222222222222222222222";

    fn target(sha: &str) -> ResolvedTarget {
        ResolvedTarget::for_cycle(
            Resolution {
                commit_sha: sha.to_string(),
                commit: CommitInfo {
                    sha: sha.to_string(),
                    message: "msg".into(),
                    author: "dev".into(),
                    committed_at: Utc::now(),
                    html_url: String::new(),
                },
                last_push_at: Utc::now(),
                pr_state: None,
                pull_request: None,
                branch: Some("main".into()),
            },
            BTreeSet::from(["demo".to_string()]),
        )
    }

    fn prior() -> InstallationState {
        let reference = TrackedReference::new("owner", "repo", ReferenceKind::Branch("main".into()));
        let mut state = InstallationState::new("demo", C1, reference, false);
        state.pending_restart = false;
        state.open_problems.clear();
        state
    }

    fn adapter(
        installer: Arc<MockInstaller>,
        problems: Arc<dyn ProblemSink>,
    ) -> InstallerAdapter {
        InstallerAdapter::new(
            Arc::new(MockConfigProvider::default()),
            Arc::new(MockSourceProvider::new()),
            installer,
            Arc::new(MockCacheProvider::new()),
            problems,
        )
    }

    #[tokio::test]
    async fn test_apply_install_success() {
        let installer = Arc::new(MockInstaller::new());
        let problems = Arc::new(MemoryProblemSink::new());
        let adapter = adapter(installer.clone(), problems.clone());

        let prior = prior();
        let decision = decide(&prior, CycleInput::Resolved(&target(C2)), 3);
        let next = adapter.apply(&prior, decision).await.unwrap();

        assert_eq!(next.installed_commit_sha, C2);
        assert!(next.pending_restart);
        assert_eq!(installer.installed_sha("demo").as_deref(), Some(C2));
        assert!(problems.is_open(ProblemKind::RestartRequired, "demo"));
    }

    #[tokio::test]
    async fn test_apply_install_failure_keeps_prior_state() {
        let installer = Arc::new(MockInstaller::new());
        installer.fail_installs(true);
        let problems = Arc::new(MemoryProblemSink::new());
        let adapter = adapter(installer.clone(), problems.clone());

        let prior = prior();
        let decision = decide(&prior, CycleInput::Resolved(&target(C2)), 3);
        let next = adapter.apply(&prior, decision).await.unwrap();

        assert_eq!(next.installed_commit_sha, C1);
        assert!(!next.pending_restart);
        assert_eq!(next.consecutive_failures, 1);
        assert!(!problems.is_open(ProblemKind::RestartRequired, "demo"));
    }

    #[tokio::test]
    async fn test_apply_install_failure_still_reports_merge() {
        let installer = Arc::new(MockInstaller::new());
        installer.fail_installs(true);
        let problems = Arc::new(MemoryProblemSink::new());
        let adapter = adapter(installer.clone(), problems.clone());

        let mut merged = target(C2);
        merged.resolution.pr_state = Some(PrState::Merged);
        let mut prior = prior();
        prior.tracked_reference.kind = ReferenceKind::PullRequest(7);

        let decision = decide(&prior, CycleInput::Resolved(&merged), 3);
        let next = adapter.apply(&prior, decision).await.unwrap();

        assert_eq!(next.installed_commit_sha, C1);
        assert!(next.has_problem(ProblemKind::PrMerged));
        assert!(problems.is_open(ProblemKind::PrMerged, "demo"));
        assert!(!problems.is_open(ProblemKind::RestartRequired, "demo"));
        assert_eq!(next.last_seen.map(|seen| seen.commit.sha), Some(C2.to_string()));
    }

    #[tokio::test]
    async fn test_report_forwards_transitions() {
        let mut sink = MockProblemSink::new();
        sink.expect_raise()
            .withf(|kind, domain, _| *kind == ProblemKind::PrMerged && domain == "demo")
            .times(1)
            .returning(|_, _, _| Ok(()));
        sink.expect_clear()
            .withf(|kind, domain| *kind == ProblemKind::DownloadFailed && domain == "demo")
            .times(1)
            .returning(|_, _| Ok(()));

        let adapter = adapter(Arc::new(MockInstaller::new()), Arc::new(sink));
        adapter
            .report(
                "demo",
                &[
                    Action::NoOp,
                    Action::RaiseProblem(ProblemKind::PrMerged, "merged".into()),
                    Action::ClearProblem(ProblemKind::DownloadFailed),
                ],
            )
            .unwrap();
    }
}
