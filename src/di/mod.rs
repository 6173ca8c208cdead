//! Dependency injection infrastructure for Integration Tester
//!
//! This module provides trait-based dependency injection so the
//! synchronization engine can run against in-memory providers in tests.
//!
//! # Example (Production)
//! ```no_run
//! use integration_tester::di::ServiceContainer;
//!
//! # fn example() -> integration_tester::core::TesterResult<()> {
//! let container = ServiceContainer::new()?;
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod mocks;
pub mod traits;

// Re-export key types
pub use container::ServiceContainer;
pub use traits::{CacheProvider, ConfigProvider, IntegrationInstaller, ProblemSink, SourceProvider};
