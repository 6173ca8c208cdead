use thiserror::Error;

pub type TesterResult<T> = Result<T, TesterError>;

#[derive(Error, Debug)]
pub enum TesterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WalkDir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The URL does not match any of the accepted GitHub shapes.
    #[error("Invalid GitHub URL: {0}")]
    InvalidUrlFormat(String),

    #[error("GitHub API rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("GitHub authentication failed: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("No integration found in pull request diff: {0}")]
    NoIntegrationInDiff(String),

    #[error("Core repository requires a pull request URL: {0}")]
    CoreRequiresPullRequest(String),

    #[error("Integration '{domain}' is already tracked by {owner}")]
    DomainAlreadyTracked { domain: String, owner: String },

    /// A directory exists at the install location but was not created by us.
    #[error("Directory for '{0}' exists and is not managed by Integration Tester")]
    UnmanagedDirectory(String),

    #[error("Integration '{0}' is not tracked")]
    NotTracked(String),

    /// Several integrations are candidates and no choice was made.
    #[error("Multiple integrations found ({0}); choose one with --domain")]
    SelectionRequired(String),

    #[error("Install error: {0}")]
    Install(String),
}

impl TesterError {
    /// Errors that may go away on their own and are retried on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TesterError::Io(_)
                | TesterError::Http(_)
                | TesterError::RateLimited(_)
                | TesterError::NotFound(_)
                | TesterError::Timeout(_)
                | TesterError::Api(_)
                | TesterError::Install(_)
                | TesterError::ManifestNotFound(_)
        )
    }

    /// Token problems are reported separately from download failures.
    pub fn is_auth(&self) -> bool {
        matches!(self, TesterError::Unauthorized(_))
    }
}
