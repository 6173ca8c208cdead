//! Core utilities shared by the Integration Tester binary and library.

pub mod core;

pub use core::credentials::CredentialStore;
pub use core::error::{TesterError, TesterResult};
pub use core::error_help::{format_error_with_help, ErrorHelp};
