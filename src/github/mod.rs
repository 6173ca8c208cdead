//! GitHub integration
//!
//! This module provides the source provider backed by the GitHub REST API:
//! - Repository, branch, pull request and commit metadata
//! - Pull request file listings
//! - Directory listings and file contents at a ref
//! - Commit tarball downloads

pub mod client;
pub mod types;

pub use client::{resolve_token, GitHubClient};
pub use types::{BranchTip, CommitInfo, DirEntry, EntryKind, PrState, PullRequestInfo, RepoInfo};
