//! Mock implementations of service traits for testing

use super::traits::{CacheProvider, ConfigProvider, IntegrationInstaller, ProblemSink, SourceProvider};
use crate::core::{TesterError, TesterResult};
use crate::github::types::{
    BranchTip, CommitInfo, DirEntry, EntryKind, PrState, PullRequestInfo, RepoInfo,
};
use crate::install::marker::Marker;
use crate::install::InstallRequest;
use crate::problems::Problem;
use crate::sync::state::ProblemKind;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock configuration provider for testing
///
/// # Example
///
/// ```
/// use integration_tester::di::mocks::MockConfigProvider;
/// use integration_tester::di::ConfigProvider;
///
/// let mut config = MockConfigProvider::default();
/// config.failure_threshold = 5;
///
/// assert_eq!(config.failure_threshold(), 5);
/// ```
#[derive(Clone)]
pub struct MockConfigProvider {
    pub api_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub failure_threshold: u32,
    pub core_repository: String,
    pub core_components_path: String,
    pub custom_components_path: String,
    pub install_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for MockConfigProvider {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            poll_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            core_repository: "home-assistant/core".to_string(),
            core_components_path: "homeassistant/components".to_string(),
            custom_components_path: "custom_components".to_string(),
            install_dir: PathBuf::from("/tmp/integration-tester-test/custom_components"),
            data_dir: PathBuf::from("/tmp/integration-tester-test/data"),
        }
    }
}

impl ConfigProvider for MockConfigProvider {
    fn api_url(&self) -> &str {
        &self.api_url
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    fn core_repository(&self) -> &str {
        &self.core_repository
    }

    fn core_components_path(&self) -> &str {
        &self.core_components_path
    }

    fn custom_components_path(&self) -> &str {
        &self.custom_components_path
    }

    fn install_dir(&self) -> PathBuf {
        self.install_dir.clone()
    }

    fn data_dir(&self) -> TesterResult<PathBuf> {
        Ok(self.data_dir.clone())
    }
}

/// Mock cache provider for testing
///
/// Stores files in memory instead of on disk.
///
/// # Example
///
/// ```
/// use integration_tester::di::mocks::MockCacheProvider;
/// use integration_tester::di::CacheProvider;
/// use std::path::PathBuf;
///
/// let cache = MockCacheProvider::new();
/// cache.add_file(PathBuf::from("/test/file.tar.gz"), b"content".to_vec());
///
/// assert!(cache.exists(&PathBuf::from("/test/file.tar.gz")));
/// ```
#[derive(Clone)]
pub struct MockCacheProvider {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MockCacheProvider {
    /// Create a new mock cache provider
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a file to the mock cache
    pub fn add_file(&self, path: PathBuf, content: Vec<u8>) {
        self.files.lock().unwrap().insert(path, content);
    }

    /// Get all files in the mock cache
    pub fn get_files(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }
}

impl Default for MockCacheProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheProvider for MockCacheProvider {
    fn archive_path(&self, owner: &str, repo: &str, sha: &str) -> PathBuf {
        PathBuf::from(format!("/mock-cache/{}/{}/{}.tar.gz", owner, repo, sha))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> TesterResult<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> TesterResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

#[derive(Default)]
struct SourceState {
    repositories: HashMap<String, RepoInfo>,
    branches: HashMap<(String, String), String>,
    pull_requests: HashMap<(String, u64), PullRequestInfo>,
    commits: HashMap<(String, String), CommitInfo>,
    diffs: HashMap<(String, u64), BTreeSet<String>>,
    directories: HashMap<(String, String), Vec<DirEntry>>,
    files: HashMap<(String, String), String>,
    failures: VecDeque<TesterError>,
    fail_downloads: bool,
    hang_branches: bool,
    calls: usize,
    downloads: Vec<String>,
}

/// Mock source provider for testing
///
/// Holds an in-memory picture of repositories. Queued failures are returned,
/// one per call, before any lookup.
#[derive(Clone, Default)]
pub struct MockSourceProvider {
    state: Arc<Mutex<SourceState>>,
}

fn repo_key(owner: &str, repo: &str) -> String {
    format!("{}/{}", owner, repo).to_lowercase()
}

fn commit_for(sha: &str) -> CommitInfo {
    CommitInfo {
        sha: sha.to_string(),
        message: format!("Commit {}", &sha[..sha.len().min(7)]),
        author: "dev".to_string(),
        committed_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        html_url: format!("https://github.com/commit/{}", sha),
    }
}

impl MockSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_repository(&self, info: RepoInfo) {
        let mut state = self.state.lock().unwrap();
        state.repositories.insert(info.full_name.to_lowercase(), info);
    }

    pub fn set_default_branch(&self, owner: &str, repo: &str, branch: &str) {
        self.set_repository(RepoInfo {
            full_name: format!("{}/{}", owner, repo),
            default_branch: branch.to_string(),
            fork: false,
            parent_full_name: None,
        });
    }

    /// Point a branch at a commit (a force-push is just another call)
    pub fn set_branch(&self, owner: &str, repo: &str, branch: &str, sha: &str) {
        self.add_commit(owner, repo, sha);
        let mut state = self.state.lock().unwrap();
        state
            .branches
            .insert((repo_key(owner, repo), branch.to_string()), sha.to_string());
    }

    pub fn set_pull_request(&self, owner: &str, repo: &str, number: u64, head_sha: &str, pr_state: PrState) {
        self.add_commit(owner, repo, head_sha);
        let mut state = self.state.lock().unwrap();
        state.pull_requests.insert(
            (repo_key(owner, repo), number),
            PullRequestInfo {
                number,
                title: format!("PR {}", number),
                state: pr_state,
                author: "contributor".to_string(),
                head_sha: head_sha.to_string(),
                head_ref: format!("pr-{}", number),
                base_ref: "dev".to_string(),
                source_repo_url: None,
                html_url: format!("https://github.com/{}/{}/pull/{}", owner, repo, number),
                pushed_at: None,
            },
        );
    }

    pub fn add_commit(&self, owner: &str, repo: &str, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .commits
            .insert((repo_key(owner, repo), sha.to_lowercase()), commit_for(sha));
    }

    pub fn set_pr_diff(&self, owner: &str, repo: &str, number: u64, paths: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.diffs.insert(
            (repo_key(owner, repo), number),
            paths.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Add `<root>/<dir>/manifest.json` with the given content, at every ref
    pub fn add_integration(&self, owner: &str, repo: &str, root: &str, dir: &str, manifest: &str) {
        let mut state = self.state.lock().unwrap();
        let key = repo_key(owner, repo);
        state
            .directories
            .entry((key.clone(), root.to_string()))
            .or_default()
            .push(DirEntry {
                name: dir.to_string(),
                kind: EntryKind::Dir,
            });
        state.files.insert(
            (key, format!("{}/{}/manifest.json", root, dir)),
            manifest.to_string(),
        );
    }

    /// Queue an error for the next call
    pub fn fail_next(&self, error: TesterError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.state.lock().unwrap().fail_downloads = fail;
    }

    /// Make branch lookups never answer, like a stalled connection
    pub fn hang_branch_lookups(&self, hang: bool) {
        self.state.lock().unwrap().hang_branches = hang;
    }

    /// Number of provider calls so far
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Commits whose archive was downloaded, in order
    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().unwrap().downloads.clone()
    }

    fn begin(&self) -> TesterResult<std::sync::MutexGuard<'_, SourceState>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let failure = state.failures.pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl SourceProvider for MockSourceProvider {
    async fn get_repository(&self, owner: &str, repo: &str) -> TesterResult<RepoInfo> {
        let state = self.begin()?;
        Ok(state
            .repositories
            .get(&repo_key(owner, repo))
            .cloned()
            .unwrap_or_else(|| RepoInfo {
                full_name: format!("{}/{}", owner, repo),
                default_branch: "main".to_string(),
                fork: false,
                parent_full_name: None,
            }))
    }

    async fn get_branch_tip(&self, owner: &str, repo: &str, branch: &str) -> TesterResult<BranchTip> {
        let hang = self.state.lock().unwrap().hang_branches;
        if hang {
            std::future::pending::<()>().await;
        }
        let state = self.begin()?;
        let sha = state
            .branches
            .get(&(repo_key(owner, repo), branch.to_string()))
            .ok_or_else(|| TesterError::NotFound(format!("{}/{}@{}", owner, repo, branch)))?;
        let commit = commit_for(sha);
        Ok(BranchTip {
            name: branch.to_string(),
            sha: sha.clone(),
            pushed_at: commit.committed_at,
            commit,
        })
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> TesterResult<PullRequestInfo> {
        let state = self.begin()?;
        state
            .pull_requests
            .get(&(repo_key(owner, repo), number))
            .cloned()
            .ok_or_else(|| TesterError::NotFound(format!("{}/{}#{}", owner, repo, number)))
    }

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> TesterResult<CommitInfo> {
        let state = self.begin()?;
        state
            .commits
            .get(&(repo_key(owner, repo), sha.to_lowercase()))
            .cloned()
            .ok_or_else(|| TesterError::NotFound(format!("{}/{}@{}", owner, repo, sha)))
    }

    async fn get_pr_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> TesterResult<BTreeSet<String>> {
        let state = self.begin()?;
        Ok(state
            .diffs
            .get(&(repo_key(owner, repo), number))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        _ref: &str,
    ) -> TesterResult<Vec<DirEntry>> {
        let state = self.begin()?;
        state
            .directories
            .get(&(repo_key(owner, repo), path.to_string()))
            .cloned()
            .ok_or_else(|| TesterError::NotFound(path.to_string()))
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        _ref: &str,
    ) -> TesterResult<String> {
        let state = self.begin()?;
        state
            .files
            .get(&(repo_key(owner, repo), path.to_string()))
            .cloned()
            .ok_or_else(|| TesterError::NotFound(path.to_string()))
    }

    async fn download_archive(&self, owner: &str, repo: &str, sha: &str) -> TesterResult<PathBuf> {
        let mut state = self.begin()?;
        if state.fail_downloads {
            return Err(TesterError::Api(format!("archive for {} unavailable", sha)));
        }
        state.downloads.push(sha.to_string());
        Ok(PathBuf::from(format!("/mock-archives/{}-{}-{}.tar.gz", owner, repo, sha)))
    }
}

/// Mock filesystem installer for testing
///
/// Keeps markers in memory; unmanaged directories can be simulated.
#[derive(Clone, Default)]
pub struct MockInstaller {
    installed: Arc<Mutex<HashMap<String, Marker>>>,
    unmanaged: Arc<Mutex<BTreeSet<String>>>,
    fail: Arc<Mutex<bool>>,
    installs: Arc<Mutex<Vec<InstallRequest>>>,
}

impl MockInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_installs(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Pretend a directory nobody manages sits at the install location
    pub fn add_unmanaged(&self, domain: &str) {
        self.unmanaged.lock().unwrap().insert(domain.to_string());
    }

    /// Put a marker in place without going through `install`
    pub fn add_marker(&self, marker: Marker) {
        self.installed
            .lock()
            .unwrap()
            .insert(marker.domain.clone(), marker);
    }

    pub fn installed_sha(&self, domain: &str) -> Option<String> {
        self.installed
            .lock()
            .unwrap()
            .get(domain)
            .map(|m| m.commit_sha.clone())
    }

    /// Every install request received, in order
    pub fn installs(&self) -> Vec<InstallRequest> {
        self.installs.lock().unwrap().clone()
    }
}

impl IntegrationInstaller for MockInstaller {
    fn install(&self, request: &InstallRequest, archive: &Path) -> TesterResult<PathBuf> {
        if *self.fail.lock().unwrap() {
            return Err(TesterError::Install(format!(
                "cannot write {}",
                archive.display()
            )));
        }
        let mut unmanaged = self.unmanaged.lock().unwrap();
        if unmanaged.contains(&request.domain) && !request.overwrite {
            return Err(TesterError::UnmanagedDirectory(request.domain.clone()));
        }
        unmanaged.remove(&request.domain);

        self.installs.lock().unwrap().push(request.clone());
        self.installed.lock().unwrap().insert(
            request.domain.clone(),
            Marker {
                domain: request.domain.clone(),
                commit_sha: request.commit_sha.clone(),
                tracked_url: request.tracked_url.clone(),
                core_repository: request.core_repository,
                installed_at: Utc::now(),
            },
        );
        Ok(PathBuf::from("/mock-install").join(&request.domain))
    }

    fn read_marker(&self, domain: &str) -> TesterResult<Option<Marker>> {
        Ok(self.installed.lock().unwrap().get(domain).cloned())
    }

    fn exists(&self, domain: &str) -> bool {
        self.installed.lock().unwrap().contains_key(domain)
            || self.unmanaged.lock().unwrap().contains(domain)
    }

    fn uninstall(&self, domain: &str, keep_files: bool) -> TesterResult<()> {
        if self.installed.lock().unwrap().remove(domain).is_some() && keep_files {
            self.unmanaged.lock().unwrap().insert(domain.to_string());
        }
        Ok(())
    }

    fn interrupted(&self) -> TesterResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn recover(&self, _domain: &str) -> TesterResult<bool> {
        Ok(false)
    }

    fn managed_markers(&self) -> TesterResult<Vec<Marker>> {
        let mut markers: Vec<_> = self.installed.lock().unwrap().values().cloned().collect();
        markers.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(markers)
    }
}

/// In-memory problem sink
#[derive(Clone, Default)]
pub struct MemoryProblemSink {
    problems: Arc<Mutex<Vec<Problem>>>,
}

impl MemoryProblemSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, kind: ProblemKind, domain: &str) -> bool {
        self.problems
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.kind == kind && p.domain == domain)
    }

    pub fn open_for(&self, domain: &str) -> BTreeSet<ProblemKind> {
        self.problems
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.domain == domain)
            .map(|p| p.kind)
            .collect()
    }
}

impl ProblemSink for MemoryProblemSink {
    fn raise(&self, kind: ProblemKind, domain: &str, context: &str) -> TesterResult<()> {
        let mut problems = self.problems.lock().unwrap();
        if !problems.iter().any(|p| p.kind == kind && p.domain == domain) {
            problems.push(Problem {
                kind,
                domain: domain.to_string(),
                context: context.to_string(),
                raised_at: Utc::now(),
            });
        }
        Ok(())
    }

    fn clear(&self, kind: ProblemKind, domain: &str) -> TesterResult<()> {
        self.problems
            .lock()
            .unwrap()
            .retain(|p| !(p.kind == kind && p.domain == domain));
        Ok(())
    }

    fn clear_all(&self, domain: &str) -> TesterResult<()> {
        self.problems.lock().unwrap().retain(|p| p.domain != domain);
        Ok(())
    }

    fn list(&self) -> TesterResult<Vec<Problem>> {
        Ok(self.problems.lock().unwrap().clone())
    }
}
