//! Per-domain synchronization engine
//!
//! Setup, scheduled checks, manual checks, removal and restart
//! acknowledgement all go through [`Tracker`]. Each holds the domain lock
//! from the first read of the entry to the last write, so a manual check
//! waits for a running scheduled one, in this process or another. Different
//! domains never contend.

use super::machine::{decide, CycleFailure, CycleInput};
use super::state::{InstallationState, LastSeen, ProblemKind};
use crate::core::{TesterError, TesterResult};
use crate::di::ServiceContainer;
use crate::github::types::short_sha;
use crate::install::InstallerAdapter;
use crate::reference::{
    classify, discover, integration_name, is_core_repository, resolve, ReferenceKind,
    ResolvedTarget, TrackedReference,
};
use crate::store::DomainLocks;
use std::collections::BTreeSet;
use std::fmt;

/// A resolution pass makes a handful of requests
const RESOLVE_TIMEOUT_FACTOR: u32 = 4;

/// Everything learned about a URL before anything is installed
#[derive(Debug, Clone)]
pub struct SetupPlan {
    pub reference: TrackedReference,
    pub core: bool,
    pub target: ResolvedTarget,
}

impl SetupPlan {
    pub fn candidates(&self) -> Vec<String> {
        self.target.candidate_domains.iter().cloned().collect()
    }
}

/// How `remove` finds an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelector {
    Domain(String),
    /// Repository URL; a locator in the URL narrows the match
    Url(String),
    /// `owner/repo`
    OwnerRepo(String),
}

impl fmt::Display for EntrySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntrySelector::Domain(domain) => write!(f, "{}", domain),
            EntrySelector::Url(url) => write!(f, "{}", url),
            EntrySelector::OwnerRepo(name) => write!(f, "{}", name),
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub domain: String,
    /// Commit installed by this cycle
    pub installed: Option<String>,
    pub raised: Vec<ProblemKind>,
    pub cleared: Vec<ProblemKind>,
    /// Why resolution or installation failed
    pub failure: Option<String>,
    pub state: InstallationState,
}

/// Outcome of startup reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Domains whose previous tree was put back after an interrupted swap
    pub restored: Vec<String>,
    /// Domains whose lost state was rebuilt from the marker
    pub recreated: Vec<String>,
    /// Domains whose persisted commit was replaced by the marker's
    pub corrected: Vec<String>,
}

/// The synchronization engine
pub struct Tracker {
    services: ServiceContainer,
    adapter: InstallerAdapter,
    locks: DomainLocks,
}

impl Tracker {
    pub fn new(services: ServiceContainer) -> Self {
        let adapter = InstallerAdapter::new(
            services.config.clone(),
            services.source.clone(),
            services.installer.clone(),
            services.cache.clone(),
            services.problems.clone(),
        );
        let locks = DomainLocks::new(services.store.data_dir());
        Self {
            services,
            adapter,
            locks,
        }
    }

    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// All tracked entries, ordered by domain
    pub fn entries(&self) -> TesterResult<Vec<InstallationState>> {
        self.services.store.all()
    }

    /// Classify, resolve and discover a URL without installing anything
    pub async fn prepare(&self, url: &str) -> TesterResult<SetupPlan> {
        let reference = classify(url)?;
        let source = self.services.source();
        let config = self.services.config();

        let info = source.get_repository(&reference.owner, &reference.repo).await?;
        let core = is_core_repository(&info, config.core_repository());
        if core && !matches!(reference.kind, ReferenceKind::PullRequest(_)) {
            return Err(TesterError::CoreRequiresPullRequest(reference.to_string()));
        }

        let resolution = self.resolve_bounded(&reference).await?;
        let domains = discover(source, config, &reference, &resolution, core).await?;
        let target = ResolvedTarget::new(resolution, domains)?;

        tracing::info!(
            "{} resolves to {} with {:?}",
            reference,
            target.resolution.commit.short_sha(),
            target.candidate_domains
        );
        Ok(SetupPlan {
            reference,
            core,
            target,
        })
    }

    /// Whether a directory nobody manages sits where `domain` would go
    pub fn has_unmanaged_directory(&self, domain: &str) -> TesterResult<bool> {
        let installer = &self.services.installer;
        Ok(installer.exists(domain) && installer.read_marker(domain)?.is_none())
    }

    /// Install a prepared plan and start tracking it
    ///
    /// The domain lock is held from the ownership check to the write of the
    /// new entry, so two setups for one domain cannot both succeed.
    pub async fn setup(
        &self,
        plan: &SetupPlan,
        domain: Option<&str>,
        overwrite: bool,
    ) -> TesterResult<InstallationState> {
        let domain = select_domain(&plan.target.candidate_domains, domain)?;
        let _guard = self.locks.lock(&domain).await?;

        if let Some(existing) = self.services.store.get(&domain)? {
            return Err(already_tracked(&domain, &existing.tracked_reference, &plan.reference));
        }

        self.adapter
            .install(&plan.reference, &plan.target, &domain, plan.core, overwrite)
            .await?;

        let mut state = InstallationState::new(
            domain.as_str(),
            plan.target.commit_sha(),
            plan.reference.clone(),
            plan.core,
        );
        state.last_seen = Some(LastSeen::observed(&plan.target.resolution));
        state.integration_name = integration_name(
            self.services.source(),
            self.services.config(),
            &plan.reference,
            plan.target.commit_sha(),
            plan.core,
            &domain,
        )
        .await;

        self.services.problems.raise(
            ProblemKind::RestartRequired,
            &domain,
            &format!("{} installed at {}", domain, state.short_sha()),
        )?;
        self.services.store.upsert(state.clone())?;

        tracing::info!("Tracking {} from {}", domain, plan.reference);
        Ok(state)
    }

    /// Run one synchronization cycle for a domain
    ///
    /// Provider and install failures are folded into the returned state;
    /// only persistence errors and unknown domains are returned as errors.
    pub async fn check(&self, domain: &str) -> TesterResult<CycleReport> {
        let _guard = self.locks.lock(domain).await?;

        let prior = self
            .services
            .store
            .get(domain)?
            .ok_or_else(|| TesterError::NotTracked(domain.to_string()))?;
        tracing::debug!("Checking {} ({})", domain, prior.tracked_reference);

        let threshold = self.services.config().failure_threshold();
        let observed = self.observe(&prior).await;
        let (decision, mut failure) = match &observed {
            Ok(target) => (decide(&prior, CycleInput::Resolved(target), threshold), None),
            Err(e) => {
                tracing::warn!("{}: resolution failed: {}", domain, e);
                let cycle_failure = CycleFailure::from(e);
                (
                    decide(&prior, CycleInput::Failed(&cycle_failure), threshold),
                    Some(e.to_string()),
                )
            }
        };

        let wanted_install = decision.install_target().is_some();
        let next = self.adapter.apply(&prior, decision).await?;
        self.services.store.upsert(next.clone())?;

        let installed = (next.installed_commit_sha != prior.installed_commit_sha)
            .then(|| next.installed_commit_sha.clone());
        if wanted_install && installed.is_none() && failure.is_none() {
            failure = Some("install failed".to_string());
        }

        Ok(CycleReport {
            domain: domain.to_string(),
            installed,
            raised: next
                .open_problems
                .difference(&prior.open_problems)
                .copied()
                .collect(),
            cleared: prior
                .open_problems
                .difference(&next.open_problems)
                .copied()
                .collect(),
            failure,
            state: next,
        })
    }

    /// Check every tracked entry, one after another
    pub async fn check_all(&self) -> TesterResult<Vec<(String, TesterResult<CycleReport>)>> {
        let mut reports = Vec::new();
        for domain in self.services.store.domains()? {
            let report = self.check(&domain).await;
            reports.push((domain, report));
        }
        Ok(reports)
    }

    async fn resolve_bounded(
        &self,
        reference: &TrackedReference,
    ) -> TesterResult<crate::reference::Resolution> {
        let timeout = self.services.config().request_timeout() * RESOLVE_TIMEOUT_FACTOR;
        tokio::time::timeout(timeout, resolve(self.services.source(), reference))
            .await
            .map_err(|_| TesterError::Timeout(format!("resolving {}", reference)))?
    }

    async fn observe(&self, prior: &InstallationState) -> TesterResult<ResolvedTarget> {
        let timeout = self.services.config().request_timeout() * RESOLVE_TIMEOUT_FACTOR;
        tokio::time::timeout(timeout, self.observe_unbounded(prior))
            .await
            .map_err(|_| TesterError::Timeout(format!("checking {}", prior.tracked_reference)))?
    }

    async fn observe_unbounded(&self, prior: &InstallationState) -> TesterResult<ResolvedTarget> {
        let reference = &prior.tracked_reference;
        let source = self.services.source();
        let resolution = resolve(source, reference).await?;

        let candidates = if prior.core_repository {
            match discover(source, self.services.config(), reference, &resolution, true).await {
                Ok(domains) => domains,
                Err(TesterError::NoIntegrationInDiff(_)) => BTreeSet::new(),
                Err(e) => return Err(e),
            }
        } else {
            BTreeSet::from([prior.integration_domain.clone()])
        };

        Ok(ResolvedTarget::for_cycle(resolution, candidates))
    }

    /// Find the single entry a selector points at
    pub fn find_entry(&self, selector: &EntrySelector) -> TesterResult<String> {
        let states = self.services.store.all()?;
        let matches: Vec<&InstallationState> = match selector {
            EntrySelector::Domain(domain) => states
                .iter()
                .filter(|s| s.integration_domain == *domain)
                .collect(),
            EntrySelector::Url(url) => {
                let wanted = classify(url)?;
                states
                    .iter()
                    .filter(|s| {
                        s.tracked_reference.same_repository(&wanted)
                            && (wanted.kind == ReferenceKind::DefaultBranch
                                || s.tracked_reference.kind == wanted.kind)
                    })
                    .collect()
            }
            EntrySelector::OwnerRepo(name) => states
                .iter()
                .filter(|s| s.tracked_reference.full_name().eq_ignore_ascii_case(name.trim()))
                .collect(),
        };

        match matches.as_slice() {
            [] => Err(TesterError::NotTracked(selector.to_string())),
            [state] => Ok(state.integration_domain.clone()),
            many => Err(TesterError::SelectionRequired(
                many.iter()
                    .map(|s| s.integration_domain.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    /// Stop tracking an entry and remove its files
    ///
    /// With `keep_files` the directory stays, without its marker.
    pub async fn remove(
        &self,
        selector: &EntrySelector,
        keep_files: bool,
    ) -> TesterResult<InstallationState> {
        let domain = self.find_entry(selector)?;
        let _guard = self.locks.lock(&domain).await?;
        if self.services.store.get(&domain)?.is_none() {
            return Err(TesterError::NotTracked(domain));
        }

        let installer = self.services.installer.clone();
        let target = domain.clone();
        tokio::task::spawn_blocking(move || installer.uninstall(&target, keep_files))
            .await
            .map_err(|e| TesterError::Install(format!("Uninstall task failed: {}", e)))??;

        self.services.problems.clear_all(&domain)?;
        let state = self.services.store.remove(&domain)?;

        tracing::info!("Stopped tracking {}", domain);
        Ok(state)
    }

    /// Record that a restart happened
    ///
    /// Clears `pending_restart` and the `RestartRequired` problem for one
    /// domain, or for all of them. Returns the domains that changed.
    pub async fn acknowledge_restart(&self, domain: Option<&str>) -> TesterResult<Vec<String>> {
        let domains = match domain {
            Some(domain) => {
                if self.services.store.get(domain)?.is_none() {
                    return Err(TesterError::NotTracked(domain.to_string()));
                }
                vec![domain.to_string()]
            }
            None => self.services.store.domains()?,
        };

        let mut acknowledged = Vec::new();
        for domain in domains {
            let _guard = self.locks.lock(&domain).await?;

            let Some(mut state) = self.services.store.get(&domain)? else {
                continue;
            };
            if !state.pending_restart && !state.has_problem(ProblemKind::RestartRequired) {
                continue;
            }

            state.pending_restart = false;
            state.open_problems.remove(&ProblemKind::RestartRequired);
            self.services.problems.clear(ProblemKind::RestartRequired, &domain)?;
            self.services.store.upsert(state)?;
            acknowledged.push(domain);
        }
        Ok(acknowledged)
    }

    /// Bring persisted state in line with what is on disk
    ///
    /// Interrupted swaps are rolled back first. Then every managed directory's
    /// marker is compared with the persisted entry: a missing entry is rebuilt
    /// from the marker, and a differing commit is taken from the marker.
    /// Domains whose lock is held elsewhere are skipped; their leftovers
    /// belong to a running operation.
    pub async fn reconcile(&self) -> TesterResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let installer = self.services.installer.clone();
        let interrupted = tokio::task::spawn_blocking(move || installer.interrupted())
            .await
            .map_err(|e| TesterError::Install(format!("Recovery task failed: {}", e)))??;

        for domain in interrupted {
            let Some(_guard) = self.locks.try_lock(&domain)? else {
                tracing::debug!("{} is busy; leaving its install directories alone", domain);
                continue;
            };
            let installer = self.services.installer.clone();
            let target = domain.clone();
            let restored = tokio::task::spawn_blocking(move || installer.recover(&target))
                .await
                .map_err(|e| TesterError::Install(format!("Recovery task failed: {}", e)))??;
            if restored {
                report.restored.push(domain);
            }
        }

        let installer = self.services.installer.clone();
        let markers = tokio::task::spawn_blocking(move || installer.managed_markers())
            .await
            .map_err(|e| TesterError::Install(format!("Recovery task failed: {}", e)))??;

        for marker in markers {
            let Some(_guard) = self.locks.try_lock(&marker.domain)? else {
                continue;
            };
            // Re-read under the lock; an install may have finished meanwhile
            let Some(marker) = self.services.installer.read_marker(&marker.domain)? else {
                continue;
            };

            match self.services.store.get(&marker.domain)? {
                None => {
                    let reference = match classify(&marker.tracked_url) {
                        Ok(reference) => reference,
                        Err(e) => {
                            tracing::warn!("Cannot rebuild {} from its marker: {}", marker.domain, e);
                            continue;
                        }
                    };

                    let mut state = InstallationState::new(
                        marker.domain.clone(),
                        marker.commit_sha.clone(),
                        reference,
                        marker.core_repository,
                    );
                    state.pending_restart = false;
                    state.open_problems.clear();
                    state.installed_at = marker.installed_at;
                    self.services.store.upsert(state)?;

                    tracing::warn!("Rebuilt state of {} from its marker", marker.domain);
                    report.recreated.push(marker.domain);
                }
                Some(mut state) if state.installed_commit_sha != marker.commit_sha => {
                    tracing::warn!(
                        "{}: on-disk commit {} replaces recorded {}",
                        marker.domain,
                        short_sha(&marker.commit_sha),
                        state.short_sha()
                    );
                    state.installed_commit_sha = marker.commit_sha.clone();
                    self.services.store.upsert(state)?;
                    report.corrected.push(marker.domain);
                }
                Some(_) => {}
            }
        }

        Ok(report)
    }
}

/// Error for a second entry claiming `domain`
fn already_tracked(
    domain: &str,
    existing: &TrackedReference,
    wanted: &TrackedReference,
) -> TesterError {
    let owner = if existing.same_repository(wanted) {
        format!("another reference of the same repository ({})", existing)
    } else {
        existing.to_string()
    };
    TesterError::DomainAlreadyTracked {
        domain: domain.to_string(),
        owner,
    }
}

/// Pick the domain to install from the candidates
///
/// A single candidate is taken as is; several need an explicit choice.
pub fn select_domain(candidates: &BTreeSet<String>, requested: Option<&str>) -> TesterResult<String> {
    let list = || candidates.iter().cloned().collect::<Vec<_>>().join(", ");
    match requested {
        Some(domain) if candidates.contains(domain) => Ok(domain.to_string()),
        Some(domain) => Err(TesterError::Config(format!(
            "'{}' is not among the integrations found: {}",
            domain,
            list()
        ))),
        None if candidates.len() == 1 => Ok(list()),
        None => Err(TesterError::SelectionRequired(list())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::mocks::{
        MemoryProblemSink, MockCacheProvider, MockConfigProvider, MockInstaller, MockSourceProvider,
    };
    use crate::di::traits::IntegrationInstaller;
    use crate::github::PrState;
    use crate::install::{FsInstaller, Marker};
    use crate::problems::IssueRegistry;
    use crate::store::StateStore;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    const C1: &str = "1111111111111111111111111111111111111111";
    const C2: &str = "2222222222222222222222222222222222222222";
    const C3: &str = "3333333333333333333333333333333333333333";

    struct Harness {
        source: Arc<MockSourceProvider>,
        installer: Arc<MockInstaller>,
        problems: Arc<MemoryProblemSink>,
        tracker: Tracker,
        _data: TempDir,
    }

    fn harness() -> Harness {
        let data = TempDir::new().unwrap();
        let source = Arc::new(MockSourceProvider::new());
        let installer = Arc::new(MockInstaller::new());
        let problems = Arc::new(MemoryProblemSink::new());
        let services = ServiceContainer::with_providers(
            Arc::new(MockConfigProvider::default()),
            Arc::new(MockCacheProvider::new()),
            source.clone(),
            installer.clone(),
            problems.clone(),
            Arc::new(StateStore::open(data.path()).unwrap()),
        );
        Harness {
            source,
            installer,
            problems,
            tracker: Tracker::new(services),
            _data: data,
        }
    }

    fn custom_repo(h: &Harness, sha: &str) {
        h.source.set_branch("owner", "repo", "main", sha);
        h.source.add_integration(
            "owner",
            "repo",
            "custom_components",
            "demo",
            r#"{"domain": "demo", "name": "Demo"}"#,
        );
    }

    async fn track(h: &Harness, url: &str, domain: Option<&str>) -> InstallationState {
        let plan = h.tracker.prepare(url).await.unwrap();
        h.tracker.setup(&plan, domain, false).await.unwrap()
    }

    #[tokio::test]
    async fn test_branch_noop_then_install() {
        let h = harness();
        custom_repo(&h, C1);
        let state = track(&h, "https://github.com/owner/repo/tree/main", None).await;
        assert_eq!(state.installed_commit_sha, C1);
        assert!(h.problems.is_open(ProblemKind::RestartRequired, "demo"));
        h.tracker.acknowledge_restart(Some("demo")).await.unwrap();

        let report = h.tracker.check("demo").await.unwrap();
        assert!(report.installed.is_none());
        assert!(report.raised.is_empty() && report.cleared.is_empty());

        h.source.set_branch("owner", "repo", "main", C2);
        let report = h.tracker.check("demo").await.unwrap();
        assert_eq!(report.installed.as_deref(), Some(C2));
        assert_eq!(report.state.installed_commit_sha, C2);
        assert!(report.state.pending_restart);
        assert_eq!(h.installer.installed_sha("demo").as_deref(), Some(C2));
        assert!(h.problems.is_open(ProblemKind::RestartRequired, "demo"));
    }

    #[tokio::test]
    async fn test_force_push_reinstalls() {
        let h = harness();
        custom_repo(&h, C1);
        track(&h, "https://github.com/owner/repo/tree/main", None).await;

        h.source.set_branch("owner", "repo", "main", C2);
        h.tracker.check("demo").await.unwrap();

        // History rewritten back to an older commit
        h.source.set_branch("owner", "repo", "main", C1);
        let report = h.tracker.check("demo").await.unwrap();
        assert_eq!(report.installed.as_deref(), Some(C1));
        assert_eq!(h.installer.installs().len(), 3);
    }

    #[tokio::test]
    async fn test_three_timeouts_raise_download_failed() {
        let h = harness();
        custom_repo(&h, C1);
        track(&h, "https://github.com/owner/repo/tree/main", None).await;

        for attempt in 1..=3 {
            h.source.fail_next(TesterError::Timeout("api.github.com".into()));
            let report = h.tracker.check("demo").await.unwrap();
            assert!(report.failure.is_some());
            assert_eq!(
                h.problems.is_open(ProblemKind::DownloadFailed, "demo"),
                attempt == 3,
                "attempt {}",
                attempt
            );
        }

        let report = h.tracker.check("demo").await.unwrap();
        assert!(report.installed.is_none());
        assert_eq!(report.cleared, vec![ProblemKind::DownloadFailed]);
        assert!(!h.problems.is_open(ProblemKind::DownloadFailed, "demo"));
        assert_eq!(report.state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_install_failures_count_and_keep_state() {
        let h = harness();
        custom_repo(&h, C1);
        track(&h, "https://github.com/owner/repo/tree/main", None).await;

        h.source.set_branch("owner", "repo", "main", C2);
        h.installer.fail_installs(true);
        let report = h.tracker.check("demo").await.unwrap();
        assert!(report.installed.is_none());
        assert_eq!(report.failure.as_deref(), Some("install failed"));
        assert_eq!(report.state.installed_commit_sha, C1);
        assert_eq!(report.state.consecutive_failures, 1);

        h.installer.fail_installs(false);
        let report = h.tracker.check("demo").await.unwrap();
        assert_eq!(report.installed.as_deref(), Some(C2));
        assert_eq!(report.state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_merged_problem_persists() {
        let h = harness();
        h.source.set_pull_request("owner", "repo", 7, C1, PrState::Open);
        h.source.add_integration("owner", "repo", "custom_components", "demo", "{}");
        track(&h, "https://github.com/owner/repo/pull/7", None).await;

        h.source.set_pull_request("owner", "repo", 7, C1, PrState::Merged);
        let report = h.tracker.check("demo").await.unwrap();
        assert_eq!(report.raised, vec![ProblemKind::PrMerged]);

        for _ in 0..2 {
            let report = h.tracker.check("demo").await.unwrap();
            assert!(report.cleared.is_empty());
            assert!(h.problems.is_open(ProblemKind::PrMerged, "demo"));
        }

        h.tracker
            .remove(&EntrySelector::Domain("demo".into()), false)
            .await
            .unwrap();
        assert!(h.problems.open_for("demo").is_empty());
    }

    #[tokio::test]
    async fn test_core_pull_request_domain_removed_from_diff() {
        let h = harness();
        h.source.set_pull_request("home-assistant", "core", 42, C1, PrState::Open);
        h.source.set_pr_diff(
            "home-assistant",
            "core",
            42,
            &[
                "homeassistant/components/hue/light.py",
                "homeassistant/components/zwave/climate.py",
            ],
        );

        let plan = h
            .tracker
            .prepare("https://github.com/home-assistant/core/pull/42")
            .await
            .unwrap();
        assert!(plan.core);
        assert_eq!(plan.candidates(), vec!["hue".to_string(), "zwave".to_string()]);
        assert!(matches!(
            h.tracker.setup(&plan, None, false).await,
            Err(TesterError::SelectionRequired(_))
        ));

        let state = h.tracker.setup(&plan, Some("hue"), false).await.unwrap();
        assert!(state.core_repository);
        assert_eq!(
            h.installer.installs()[0].source_path,
            "homeassistant/components/hue"
        );

        h.source.set_pull_request("home-assistant", "core", 42, C2, PrState::Open);
        h.source.set_pr_diff(
            "home-assistant",
            "core",
            42,
            &["homeassistant/components/zwave/climate.py"],
        );
        let report = h.tracker.check("hue").await.unwrap();
        assert_eq!(report.raised, vec![ProblemKind::IntegrationRemovedFromDiff]);
        assert!(report.installed.is_none());
        assert_eq!(h.installer.installed_sha("hue").as_deref(), Some(C1));
        assert_eq!(h.installer.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_core_repository_requires_pull_request() {
        let h = harness();
        h.source.set_branch("home-assistant", "core", "dev", C1);
        assert!(matches!(
            h.tracker
                .prepare("https://github.com/home-assistant/core/tree/dev")
                .await,
            Err(TesterError::CoreRequiresPullRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_reference_never_reinstalls() {
        let h = harness();
        h.source.add_commit("owner", "repo", C3);
        h.source.add_integration("owner", "repo", "custom_components", "demo", "{}");
        let url = format!("https://github.com/owner/repo/commit/{}", C3);
        track(&h, &url, None).await;

        for _ in 0..3 {
            let report = h.tracker.check("demo").await.unwrap();
            assert!(report.installed.is_none());
        }
        assert_eq!(h.installer.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_second_entry_for_domain_rejected() {
        let h = harness();
        custom_repo(&h, C1);
        h.source.set_branch("owner", "repo", "dev", C2);
        track(&h, "https://github.com/owner/repo/tree/main", None).await;

        let plan = h
            .tracker
            .prepare("https://github.com/owner/repo/tree/dev")
            .await
            .unwrap();
        assert!(matches!(
            h.tracker.setup(&plan, None, false).await,
            Err(TesterError::DomainAlreadyTracked { .. })
        ));
    }

    #[tokio::test]
    async fn test_unmanaged_directory_needs_overwrite() {
        let h = harness();
        custom_repo(&h, C1);
        h.installer.add_unmanaged("demo");

        let plan = h
            .tracker
            .prepare("https://github.com/owner/repo")
            .await
            .unwrap();
        assert!(h.tracker.has_unmanaged_directory("demo").unwrap());
        assert!(matches!(
            h.tracker.setup(&plan, None, false).await,
            Err(TesterError::UnmanagedDirectory(_))
        ));
        assert!(h.tracker.entries().unwrap().is_empty());

        h.tracker.setup(&plan, None, true).await.unwrap();
        assert_eq!(h.tracker.entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_are_serialized() {
        let h = harness();
        custom_repo(&h, C1);
        track(&h, "https://github.com/owner/repo/tree/main", None).await;
        h.source.set_branch("owner", "repo", "main", C2);

        let (a, b) = tokio::join!(h.tracker.check("demo"), h.tracker.check("demo"));
        let installed: Vec<_> = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter_map(|r| r.installed)
            .collect();
        assert_eq!(installed, vec![C2.to_string()]);
        assert_eq!(h.installer.installs().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_by_selectors() {
        let h = harness();
        custom_repo(&h, C1);
        h.source.set_pull_request("owner", "other", 3, C2, PrState::Open);
        h.source.add_integration("owner", "other", "custom_components", "extra", "{}");
        track(&h, "https://github.com/owner/repo/tree/main", None).await;
        track(&h, "https://github.com/owner/other/pull/3", None).await;

        assert!(matches!(
            h.tracker.find_entry(&EntrySelector::OwnerRepo("nobody/none".into())),
            Err(TesterError::NotTracked(_))
        ));
        assert_eq!(
            h.tracker
                .find_entry(&EntrySelector::Url("https://github.com/Owner/Other".into()))
                .unwrap(),
            "extra"
        );
        assert!(matches!(
            h.tracker
                .find_entry(&EntrySelector::Url("https://github.com/owner/other/pull/4".into())),
            Err(TesterError::NotTracked(_))
        ));

        let removed = h
            .tracker
            .remove(&EntrySelector::OwnerRepo("owner/repo".into()), true)
            .await
            .unwrap();
        assert_eq!(removed.integration_domain, "demo");
        assert!(h.installer.installed_sha("demo").is_none());
        assert!(h.tracker.has_unmanaged_directory("demo").unwrap());
        assert_eq!(h.tracker.entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_restart() {
        let h = harness();
        custom_repo(&h, C1);
        track(&h, "https://github.com/owner/repo", None).await;

        assert_eq!(h.tracker.acknowledge_restart(None).await.unwrap(), vec!["demo"]);
        assert!(!h.problems.is_open(ProblemKind::RestartRequired, "demo"));
        assert!(!h.tracker.entries().unwrap()[0].pending_restart);
        assert!(h.tracker.acknowledge_restart(None).await.unwrap().is_empty());
        assert!(matches!(
            h.tracker.acknowledge_restart(Some("missing")).await,
            Err(TesterError::NotTracked(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_from_markers() {
        let h = harness();
        custom_repo(&h, C1);
        track(&h, "https://github.com/owner/repo/tree/main", None).await;

        // On-disk commit disagrees with the record
        h.installer.add_marker(Marker {
            domain: "demo".into(),
            commit_sha: C2.into(),
            tracked_url: "https://github.com/owner/repo/tree/main".into(),
            core_repository: false,
            installed_at: Utc::now(),
        });
        // Managed directory with no record at all
        h.installer.add_marker(Marker {
            domain: "lost".into(),
            commit_sha: C3.into(),
            tracked_url: "https://github.com/someone/lost/pull/9".into(),
            core_repository: false,
            installed_at: Utc::now(),
        });

        let report = h.tracker.reconcile().await.unwrap();
        assert_eq!(report.corrected, vec!["demo".to_string()]);
        assert_eq!(report.recreated, vec!["lost".to_string()]);

        let lost = h.tracker.services().store.get("lost").unwrap().unwrap();
        assert_eq!(lost.installed_commit_sha, C3);
        assert_eq!(lost.tracked_reference.kind, ReferenceKind::PullRequest(9));
        assert_eq!(
            h.tracker
                .services()
                .store
                .get("demo")
                .unwrap()
                .unwrap()
                .installed_commit_sha,
            C2
        );

        // Reconciling again changes nothing
        assert_eq!(h.tracker.reconcile().await.unwrap(), ReconcileReport::default());
    }

    #[tokio::test]
    async fn test_failed_install_still_reports_merge() {
        let h = harness();
        h.source.set_pull_request("owner", "repo", 7, C1, PrState::Open);
        h.source.add_integration("owner", "repo", "custom_components", "demo", "{}");
        track(&h, "https://github.com/owner/repo/pull/7", None).await;
        h.tracker.acknowledge_restart(None).await.unwrap();

        h.source.set_pull_request("owner", "repo", 7, C2, PrState::Merged);
        h.installer.fail_installs(true);
        for cycle in 1..=4 {
            let report = h.tracker.check("demo").await.unwrap();
            assert!(report.state.has_problem(ProblemKind::PrMerged), "cycle {}", cycle);
            assert!(h.problems.is_open(ProblemKind::PrMerged, "demo"));
            assert_eq!(report.state.installed_commit_sha, C1);
            assert!(!report.state.pending_restart);
            assert_eq!(
                h.problems.is_open(ProblemKind::DownloadFailed, "demo"),
                cycle >= 3,
                "cycle {}",
                cycle
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_source_times_out_and_counts() {
        let h = harness();
        custom_repo(&h, C1);
        track(&h, "https://github.com/owner/repo/tree/main", None).await;

        h.source.hang_branch_lookups(true);
        let started = tokio::time::Instant::now();
        let report = h.tracker.check("demo").await.unwrap();

        let bound = MockConfigProvider::default().request_timeout * RESOLVE_TIMEOUT_FACTOR;
        assert!(started.elapsed() >= bound);
        assert!(report
            .failure
            .as_deref()
            .is_some_and(|failure| failure.starts_with("Request timed out")));
        assert_eq!(report.state.consecutive_failures, 1);
        assert_eq!(report.state.installed_commit_sha, C1);
    }

    #[tokio::test]
    async fn test_setup_records_name_and_pull_request() {
        let h = harness();
        h.source.set_pull_request("owner", "repo", 7, C1, PrState::Open);
        h.source.add_integration(
            "owner",
            "repo",
            "custom_components",
            "demo",
            r#"{"domain": "demo", "name": "Demo Lights"}"#,
        );

        let state = track(&h, "https://github.com/owner/repo/pull/7", None).await;
        assert_eq!(state.integration_name.as_deref(), Some("Demo Lights"));

        let seen = state.last_seen.unwrap();
        assert_eq!(seen.branch.as_deref(), Some("pr-7"));
        let pr = seen.pull_request.unwrap();
        assert_eq!(pr.title, "PR 7");
        assert_eq!(pr.author, "contributor");
        assert_eq!(pr.base_ref, "dev");
    }

    /// A tracker of its own on `data`, like a separate process
    fn tracker_on(
        data: &std::path::Path,
        source: &Arc<MockSourceProvider>,
        installer: &Arc<dyn IntegrationInstaller>,
    ) -> Tracker {
        Tracker::new(ServiceContainer::with_providers(
            Arc::new(MockConfigProvider::default()),
            Arc::new(MockCacheProvider::new()),
            source.clone(),
            installer.clone(),
            Arc::new(IssueRegistry::open(data).unwrap()),
            Arc::new(StateStore::open(data).unwrap()),
        ))
    }

    #[tokio::test]
    async fn test_trackers_sharing_data_directory_stay_consistent() {
        let data = TempDir::new().unwrap();
        let source = Arc::new(MockSourceProvider::new());
        source.set_branch("owner", "repo", "main", C1);
        source.add_integration("owner", "repo", "custom_components", "demo", "{}");
        source.set_branch("owner", "other", "main", C2);
        source.add_integration("owner", "other", "custom_components", "extra", "{}");
        let installer: Arc<dyn IntegrationInstaller> = Arc::new(MockInstaller::new());

        let add = tracker_on(data.path(), &source, &installer);
        let plan = add.prepare("https://github.com/owner/repo/tree/main").await.unwrap();
        add.setup(&plan, None, false).await.unwrap();

        let watch = tracker_on(data.path(), &source, &installer);
        let command = tracker_on(data.path(), &source, &installer);

        // Acknowledged elsewhere, then a watch cycle writes the entry back
        command.acknowledge_restart(Some("demo")).await.unwrap();
        let report = watch.check("demo").await.unwrap();
        assert!(!report.state.pending_restart);
        assert!(!command.entries().unwrap()[0].pending_restart);
        let problems = command.services().problems().list().unwrap();
        assert!(problems.iter().all(|p| p.kind != ProblemKind::RestartRequired));

        // Added elsewhere, then a watch cycle for another domain
        let plan = command.prepare("https://github.com/owner/other/tree/main").await.unwrap();
        command.setup(&plan, None, false).await.unwrap();
        watch.check("demo").await.unwrap();
        assert_eq!(watch.entries().unwrap().len(), 2);
        assert!(matches!(
            watch.setup(&plan, None, false).await,
            Err(TesterError::DomainAlreadyTracked { .. })
        ));

        // Removed elsewhere: the watch stops seeing it and never writes it back
        command
            .remove(&EntrySelector::Domain("demo".into()), false)
            .await
            .unwrap();
        assert!(matches!(
            watch.check("demo").await,
            Err(TesterError::NotTracked(_))
        ));
        assert_eq!(
            add.services().store.domains().unwrap(),
            vec!["extra".to_string()]
        );
    }

    #[tokio::test]
    async fn test_check_waits_for_lock_held_elsewhere() {
        let data = TempDir::new().unwrap();
        let source = Arc::new(MockSourceProvider::new());
        source.set_branch("owner", "repo", "main", C1);
        source.add_integration("owner", "repo", "custom_components", "demo", "{}");
        let installer: Arc<dyn IntegrationInstaller> = Arc::new(MockInstaller::new());

        let tracker = tracker_on(data.path(), &source, &installer);
        let plan = tracker.prepare("https://github.com/owner/repo").await.unwrap();
        tracker.setup(&plan, None, false).await.unwrap();

        let held = DomainLocks::new(data.path()).lock("demo").await.unwrap();
        let check = tokio::spawn(async move { tracker.check("demo").await.map(|r| r.domain) });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!check.is_finished());

        drop(held);
        assert_eq!(check.await.unwrap().unwrap(), "demo");
    }

    #[tokio::test]
    async fn test_reconcile_leaves_running_install_alone() {
        let data = TempDir::new().unwrap();
        let install_dir = data.path().join("custom_components");
        std::fs::create_dir_all(install_dir.join(".demo.staging")).unwrap();
        let installer: Arc<dyn IntegrationInstaller> = Arc::new(FsInstaller::new(install_dir.clone()));
        let tracker = tracker_on(data.path(), &Arc::new(MockSourceProvider::new()), &installer);

        let held = DomainLocks::new(data.path()).lock("demo").await.unwrap();
        tracker.reconcile().await.unwrap();
        assert!(install_dir.join(".demo.staging").exists());

        drop(held);
        tracker.reconcile().await.unwrap();
        assert!(!install_dir.join(".demo.staging").exists());
    }

    #[test]
    fn test_select_domain() {
        let one = BTreeSet::from(["demo".to_string()]);
        let two = BTreeSet::from(["hue".to_string(), "zwave".to_string()]);
        assert_eq!(select_domain(&one, None).unwrap(), "demo");
        assert_eq!(select_domain(&two, Some("zwave")).unwrap(), "zwave");
        assert!(matches!(
            select_domain(&two, None),
            Err(TesterError::SelectionRequired(list)) if list == "hue, zwave"
        ));
        assert!(matches!(
            select_domain(&two, Some("light")),
            Err(TesterError::Config(_))
        ));
    }
}
