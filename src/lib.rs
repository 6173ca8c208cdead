//! Integration Tester
//!
//! Installs integrations straight from a GitHub default branch, branch, pull
//! request or commit, and keeps them in sync with upstream. Core utilities
//! (errors, paths, credentials) come from `tester-core`.

pub use tester_core::{format_error_with_help, CredentialStore, ErrorHelp, TesterError, TesterResult};

/// Core module re-exported from tester-core.
pub mod core {
    pub use tester_core::core::*;
    pub use tester_core::*;
}

/// Configuration management.
pub mod config;

/// Downloaded archive cache.
pub mod cache;

/// GitHub source provider.
pub mod github;

/// Dependency injection infrastructure.
pub mod di;

/// URL classification, reference resolution and domain discovery.
pub mod reference;

/// Installation state, the synchronization state machine and its scheduler.
pub mod sync;

/// Atomic filesystem installation.
pub mod install;

/// Operator-visible problems.
pub mod problems;

/// Persisted installation entries.
pub mod store;
