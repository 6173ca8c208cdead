//! Service container for dependency injection

use super::traits::{CacheProvider, ConfigProvider, IntegrationInstaller, ProblemSink, SourceProvider};
use crate::cache::Cache;
use crate::config::Config;
use crate::core::path::ensure_dir;
use crate::core::TesterResult;
use crate::github::{resolve_token, GitHubClient};
use crate::install::FsInstaller;
use crate::problems::IssueRegistry;
use crate::store::StateStore;
use std::sync::Arc;

/// Service container for dependency injection
///
/// This container holds all core services and provides access to them
/// through trait objects. It uses `Arc<dyn Trait>` for runtime polymorphism,
/// allowing easy swapping of implementations for testing.
///
/// # Example (Testing)
///
/// ```
/// use integration_tester::di::{ServiceContainer, mocks::*};
/// use integration_tester::store::StateStore;
/// use std::sync::Arc;
///
/// # fn example() -> integration_tester::core::TesterResult<()> {
/// let data = tempfile::tempdir()?;
/// let container = ServiceContainer::with_providers(
///     Arc::new(MockConfigProvider::default()),
///     Arc::new(MockCacheProvider::new()),
///     Arc::new(MockSourceProvider::new()),
///     Arc::new(MockInstaller::new()),
///     Arc::new(MemoryProblemSink::new()),
///     Arc::new(StateStore::open(data.path())?),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceContainer {
    pub config: Arc<dyn ConfigProvider>,
    pub cache: Arc<dyn CacheProvider>,
    pub source: Arc<dyn SourceProvider>,
    pub installer: Arc<dyn IntegrationInstaller>,
    pub problems: Arc<dyn ProblemSink>,
    pub store: Arc<StateStore>,
}

impl ServiceContainer {
    /// Create a new service container with production implementations
    ///
    /// This creates instances of all core services using the real implementations:
    /// - Loads config from disk
    /// - Creates the archive cache in the configured directory
    /// - Initializes the GitHub client with the resolved token
    /// - Opens the persisted entries and problems in the data directory
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Config file cannot be loaded or created
    /// - Cache or data directory cannot be created
    /// - The HTTP client cannot be built
    pub fn new() -> TesterResult<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    /// Create production services from an already loaded config
    pub fn from_config(config: Config) -> TesterResult<Self> {
        let cache: Arc<dyn CacheProvider> = Arc::new(Cache::new(config.get_cache_dir()?)?);
        let data_dir = config.get_data_dir()?;
        ensure_dir(&data_dir)?;

        let token = resolve_token(&config);
        let source = GitHubClient::new(&config, token, cache.clone())?;

        Ok(Self {
            installer: Arc::new(FsInstaller::new(config.get_install_dir())),
            problems: Arc::new(IssueRegistry::open(&data_dir)?),
            store: Arc::new(StateStore::open(&data_dir)?),
            source: Arc::new(source),
            cache,
            config: Arc::new(config),
        })
    }

    /// Create a service container with custom provider implementations
    ///
    /// This is primarily useful for testing, where you can inject mock
    /// implementations of each service.
    pub fn with_providers(
        config: Arc<dyn ConfigProvider>,
        cache: Arc<dyn CacheProvider>,
        source: Arc<dyn SourceProvider>,
        installer: Arc<dyn IntegrationInstaller>,
        problems: Arc<dyn ProblemSink>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            config,
            cache,
            source,
            installer,
            problems,
            store,
        }
    }

    /// Get the configuration provider
    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    /// Get the source provider
    pub fn source(&self) -> &dyn SourceProvider {
        self.source.as_ref()
    }

    /// Get the problem sink
    pub fn problems(&self) -> &dyn ProblemSink {
        self.problems.as_ref()
    }
}
