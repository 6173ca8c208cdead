use crate::core::path::{config_file, ensure_dir};
use crate::core::{TesterError, TesterResult};
use crate::di::ConfigProvider;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GitHub REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// GitHub token (lowest precedence after GITHUB_TOKEN and the OS keychain)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Seconds between scheduled checks of each tracked entry
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound for a single GitHub request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Consecutive failed cycles before the download_failed problem is raised
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// The core repository whose pull requests touch many integrations
    #[serde(default = "default_core_repository")]
    pub core_repository: String,

    /// Directory holding integrations inside the core repository
    #[serde(default = "default_core_components_path")]
    pub core_components_path: String,

    /// Directory holding integrations inside custom repositories
    #[serde(default = "default_custom_components_path")]
    pub custom_components_path: String,

    /// Where integrations are installed (defaults to ./custom_components)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,

    /// Where entries and problems are persisted
    ///
    /// Default locations:
    /// - Windows: %APPDATA%\integration-tester
    /// - Linux: ~/.local/share/integration-tester
    /// - macOS: ~/Library/Application Support/integration-tester
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Where downloaded archives are cached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_core_repository() -> String {
    "home-assistant/core".to_string()
}

fn default_core_components_path() -> String {
    "homeassistant/components".to_string()
}

fn default_custom_components_path() -> String {
    "custom_components".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            github_token: None,
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            failure_threshold: default_failure_threshold(),
            core_repository: default_core_repository(),
            core_components_path: default_core_components_path(),
            custom_components_path: default_custom_components_path(),
            install_dir: None,
            data_dir: None,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load config from platform-specific config directory, creating default if it doesn't exist
    ///
    /// Config locations:
    /// - Windows: %APPDATA%\integration-tester\config.yaml
    /// - Linux: ~/.config/integration-tester/config.yaml
    /// - macOS: ~/Library/Application Support/integration-tester/config.yaml
    pub fn load() -> TesterResult<Self> {
        let config_path = config_file()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| TesterError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save config to platform-specific config directory
    pub fn save(&self) -> TesterResult<()> {
        let config_path = config_file()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| TesterError::Path("Invalid config path".to_string()))?;

        ensure_dir(config_dir)?;

        let content = serde_yaml::to_string(self)
            .map_err(|e| TesterError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Reject values that would make polling or timeouts unbounded
    pub fn validate(&self) -> TesterResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(TesterError::Config(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(TesterError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(TesterError::Config(
                "failure_threshold must be greater than zero".to_string(),
            ));
        }
        if self.core_repository.split('/').count() != 2 {
            return Err(TesterError::Config(format!(
                "core_repository must look like owner/repo, got '{}'",
                self.core_repository
            )));
        }
        Ok(())
    }

    pub fn get_install_dir(&self) -> PathBuf {
        match self.install_dir {
            Some(ref dir) => PathBuf::from(dir),
            None => PathBuf::from(default_custom_components_path()),
        }
    }

    pub fn get_data_dir(&self) -> TesterResult<PathBuf> {
        match self.data_dir {
            Some(ref dir) => Ok(PathBuf::from(dir)),
            None => crate::core::path::data_dir(),
        }
    }

    pub fn get_cache_dir(&self) -> TesterResult<PathBuf> {
        match self.cache_dir {
            Some(ref dir) => Ok(PathBuf::from(dir)),
            None => crate::core::path::cache_dir(),
        }
    }
}

impl ConfigProvider for Config {
    fn api_url(&self) -> &str {
        &self.api_url
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
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
        self.get_install_dir()
    }

    fn data_dir(&self) -> TesterResult<PathBuf> {
        self.get_data_dir()
    }
}
