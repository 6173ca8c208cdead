//! GitHub API client implementation

use crate::config::Config;
use crate::core::credentials::GITHUB_TOKEN_KEY;
use crate::core::{CredentialStore, TesterError, TesterResult};
use crate::di::traits::{CacheProvider, ConfigProvider, SourceProvider};
use crate::github::types::{
    ApiBranch, ApiCommit, ApiContentEntry, ApiFileContent, ApiPrFile, ApiPullRequest,
    ApiRateLimitResponse, ApiRepository, BranchTip, CommitInfo, DirEntry, EntryKind,
    PullRequestInfo, RateLimit, RepoInfo,
};
use async_trait::async_trait;
use reqwest::{header, Client as HttpClient, StatusCode};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

/// Files listed per page when paging through a pull request diff
const PR_FILES_PER_PAGE: usize = 100;

/// GitHub caps the pull request files listing at 3000 entries
const PR_FILES_MAX_PAGES: usize = 30;

/// Archives of large repositories take longer than a metadata call
const ARCHIVE_TIMEOUT_FACTOR: u32 = 10;

/// Pick the token to use: GITHUB_TOKEN, then the OS keychain, then config
pub fn resolve_token(config: &Config) -> Option<String> {
    std::env::var("GITHUB_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .or_else(|| CredentialStore::retrieve(GITHUB_TOKEN_KEY).ok())
        .or_else(|| config.github_token.clone())
}

/// GitHub API client
pub struct GitHubClient {
    http_client: HttpClient,
    api_url: String,
    token: Option<String>,
    request_timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<dyn CacheProvider>,
}

/// Rate limiter for GitHub API
struct RateLimiter {
    remaining: Mutex<u64>,
    reset_time: Mutex<SystemTime>,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(
        config: &dyn ConfigProvider,
        token: Option<String>,
        cache: Arc<dyn CacheProvider>,
    ) -> TesterResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("integration-tester"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        if let Some(ref token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("token {}", token))
                    .map_err(|e| TesterError::Config(format!("Invalid GitHub token: {}", e)))?,
            );
        }

        let request_timeout = config.request_timeout();
        let http_client = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| TesterError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let has_token = token.is_some();
        Ok(Self {
            http_client,
            api_url: config.api_url().trim_end_matches('/').to_string(),
            token,
            request_timeout,
            rate_limiter: Arc::new(RateLimiter {
                remaining: Mutex::new(if has_token { 5000 } else { 60 }),
                reset_time: Mutex::new(SystemTime::now() + Duration::from_secs(3600)),
            }),
            cache,
        })
    }

    /// Get repository information
    pub async fn get_repository(&self, owner: &str, repo: &str) -> TesterResult<RepoInfo> {
        let url = format!("{}/repos/{}/{}", self.api_url, owner, repo);
        let api: ApiRepository = self.api_get(&url).await?;
        Ok(RepoInfo {
            default_branch: api.default_branch.unwrap_or_else(|| "main".to_string()),
            fork: api.fork,
            parent_full_name: api.parent.map(|p| p.full_name),
            full_name: api.full_name,
        })
    }

    /// Get the tip of a branch
    pub async fn get_branch_tip(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> TesterResult<BranchTip> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            self.api_url,
            owner,
            repo,
            urlencoding::encode(branch)
        );
        let api: ApiBranch = self.api_get(&url).await?;
        let commit = api.commit.into_info();
        Ok(BranchTip {
            name: api.name,
            sha: commit.sha.clone(),
            pushed_at: commit.committed_at,
            commit,
        })
    }

    /// Get information about a pull request
    pub async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> TesterResult<PullRequestInfo> {
        let url = format!("{}/repos/{}/{}/pulls/{}", self.api_url, owner, repo, number);
        let api: ApiPullRequest = self.api_get(&url).await?;
        Ok(api.into_info())
    }

    /// Get information about a commit
    pub async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> TesterResult<CommitInfo> {
        let url = format!("{}/repos/{}/{}/commits/{}", self.api_url, owner, repo, sha);
        let api: ApiCommit = self.api_get(&url).await?;
        Ok(api.into_info())
    }

    /// Get the paths changed by a pull request
    pub async fn get_pr_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> TesterResult<BTreeSet<String>> {
        let mut files = BTreeSet::new();

        for page in 1..=PR_FILES_MAX_PAGES {
            let url = format!(
                "{}/repos/{}/{}/pulls/{}/files?per_page={}&page={}",
                self.api_url, owner, repo, number, PR_FILES_PER_PAGE, page
            );
            let batch: Vec<ApiPrFile> = self.api_get(&url).await?;
            let count = batch.len();
            files.extend(batch.into_iter().map(|f| f.filename));

            if count < PR_FILES_PER_PAGE {
                break;
            }
        }

        Ok(files)
    }

    /// List a directory of a repository at a ref
    pub async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_: &str,
    ) -> TesterResult<Vec<DirEntry>> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_url,
            owner,
            repo,
            path,
            urlencoding::encode(ref_)
        );
        let response = self.api_request(&url).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TesterError::Api(format!("Failed to parse contents response: {}", e)))?;

        if !body.is_array() {
            return Err(TesterError::Api(format!("Path {} is not a directory", path)));
        }

        let entries: Vec<ApiContentEntry> = serde_json::from_value(body)?;
        Ok(entries
            .into_iter()
            .map(|e| DirEntry {
                kind: match e.kind.as_str() {
                    "dir" => EntryKind::Dir,
                    "file" => EntryKind::File,
                    _ => EntryKind::Other,
                },
                name: e.name,
            })
            .collect())
    }

    /// Get file content from a repository
    pub async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_: &str,
    ) -> TesterResult<String> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_url,
            owner,
            repo,
            path,
            urlencoding::encode(ref_)
        );

        let content_resp: ApiFileContent = self.api_get(&url).await?;

        if content_resp.encoding != "base64" {
            return Err(TesterError::Api(format!(
                "Unexpected encoding: {}",
                content_resp.encoding
            )));
        }

        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(content_resp.content.replace('\n', ""))
            .map_err(|e| TesterError::Api(format!("Failed to decode base64 content: {}", e)))?;

        String::from_utf8(decoded)
            .map_err(|e| TesterError::Api(format!("Invalid UTF-8 in file content: {}", e)))
    }

    /// Download the tarball for a commit into the archive cache
    pub async fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> TesterResult<PathBuf> {
        let cache_path = self.cache.archive_path(owner, repo, sha);
        if self.cache.exists(&cache_path) {
            tracing::debug!("Using cached archive {}", cache_path.display());
            return Ok(cache_path);
        }

        let url = format!("{}/repos/{}/{}/tarball/{}", self.api_url, owner, repo, sha);
        self.check_rate_limit().await?;

        let response = self
            .http_client
            .get(&url)
            .timeout(self.request_timeout * ARCHIVE_TIMEOUT_FACTOR)
            .send()
            .await
            .map_err(|e| map_transport_error(e, &url))?;

        self.update_rate_limit(&response).await;
        let response = check_status(response, &url, self.token.is_some()).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, &url))?;

        self.cache.write(&cache_path, &bytes)?;

        Ok(cache_path)
    }

    /// Query the rate limit endpoint
    ///
    /// Authenticated clients get 5000 requests per hour, anonymous ones 60.
    pub async fn rate_limit(&self) -> TesterResult<RateLimit> {
        let url = format!("{}/rate_limit", self.api_url);
        let response: ApiRateLimitResponse = self.api_get(&url).await?;
        Ok(response.resources.core)
    }

    /// Check that the configured token is accepted and authenticated
    pub async fn validate_token(&self) -> TesterResult<bool> {
        if self.token.is_none() {
            return Ok(false);
        }
        Ok(self.rate_limit().await?.limit > 60)
    }

    /// Make an API request and handle rate limiting
    async fn api_request(&self, url: &str) -> TesterResult<reqwest::Response> {
        self.check_rate_limit().await?;

        let response = self
            .http_client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(e, url))?;

        self.update_rate_limit(&response).await;

        check_status(response, url, self.token.is_some()).await
    }

    /// Make an API GET request and parse JSON response
    async fn api_get<T: serde::de::DeserializeOwned>(&self, url: &str) -> TesterResult<T> {
        let response = self.api_request(url).await?;

        response
            .json()
            .await
            .map_err(|e| TesterError::Api(format!("Failed to parse GitHub API response: {}", e)))
    }

    /// Check if we're within rate limits
    async fn check_rate_limit(&self) -> TesterResult<()> {
        let remaining = *self.rate_limiter.remaining.lock().await;
        let reset_time = *self.rate_limiter.reset_time.lock().await;

        if remaining == 0 {
            let now = SystemTime::now();
            if now < reset_time {
                let wait_duration = reset_time.duration_since(now).unwrap_or(Duration::ZERO);
                return Err(TesterError::RateLimited(format!(
                    "Reset in {} seconds. {}",
                    wait_duration.as_secs(),
                    if self.token.is_none() {
                        "Consider setting GITHUB_TOKEN to increase rate limit to 5000/hour."
                    } else {
                        ""
                    }
                )));
            }
        }

        Ok(())
    }

    /// Update rate limit from response headers
    async fn update_rate_limit(&self, response: &reqwest::Response) {
        if let Some(remaining) = header_u64(response, "x-ratelimit-remaining") {
            *self.rate_limiter.remaining.lock().await = remaining;
        }

        if let Some(reset) = header_u64(response, "x-ratelimit-reset") {
            *self.rate_limiter.reset_time.lock().await =
                SystemTime::UNIX_EPOCH + Duration::from_secs(reset);
        }
    }
}

fn header_u64(response: &reqwest::Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

fn map_transport_error(error: reqwest::Error, url: &str) -> TesterError {
    if error.is_timeout() {
        TesterError::Timeout(url.to_string())
    } else {
        TesterError::Http(error)
    }
}

/// Translate non-success statuses into the error taxonomy
///
/// A 403 with requests left is a rejected token only when one was sent.
async fn check_status(
    response: reqwest::Response,
    url: &str,
    authenticated: bool,
) -> TesterResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let exhausted = header_u64(&response, "x-ratelimit-remaining") == Some(0);
    let detail = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => TesterError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => TesterError::RateLimited(detail),
        StatusCode::FORBIDDEN if exhausted => TesterError::RateLimited(detail),
        StatusCode::FORBIDDEN if authenticated => TesterError::Unauthorized(detail),
        StatusCode::FORBIDDEN => TesterError::Api(format!("HTTP {}: {}", status, detail)),
        StatusCode::NOT_FOUND => TesterError::NotFound(url.to_string()),
        _ => TesterError::Api(format!("HTTP {}: {}", status, detail)),
    })
}

#[async_trait]
impl SourceProvider for GitHubClient {
    async fn get_repository(&self, owner: &str, repo: &str) -> TesterResult<RepoInfo> {
        Self::get_repository(self, owner, repo).await
    }

    async fn get_branch_tip(&self, owner: &str, repo: &str, branch: &str) -> TesterResult<BranchTip> {
        Self::get_branch_tip(self, owner, repo, branch).await
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> TesterResult<PullRequestInfo> {
        Self::get_pull_request(self, owner, repo, number).await
    }

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> TesterResult<CommitInfo> {
        Self::get_commit(self, owner, repo, sha).await
    }

    async fn get_pr_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> TesterResult<BTreeSet<String>> {
        Self::get_pr_diff(self, owner, repo, number).await
    }

    async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_: &str,
    ) -> TesterResult<Vec<DirEntry>> {
        Self::list_directory(self, owner, repo, path, ref_).await
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_: &str,
    ) -> TesterResult<String> {
        Self::get_file_content(self, owner, repo, path, ref_).await
    }

    async fn download_archive(&self, owner: &str, repo: &str, sha: &str) -> TesterResult<PathBuf> {
        Self::download_archive(self, owner, repo, sha).await
    }
}
