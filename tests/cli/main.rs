//! Command-line tests for integration-tester
//!
//! Every test runs the binary in an isolated temp directory with its own
//! config, data and cache locations.

mod commands;
mod common;
mod github_flow;
