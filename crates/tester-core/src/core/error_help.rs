//! Human-readable remedies for CLI error output

use crate::core::error::TesterError;

/// A remedy attached to an error when printed to the terminal
pub trait ErrorHelp {
    fn help(&self) -> Option<&'static str>;
}

impl ErrorHelp for TesterError {
    fn help(&self) -> Option<&'static str> {
        match self {
            TesterError::InvalidUrlFormat(_) => Some(
                "Use https://github.com/<owner>/<repo>, .../tree/<branch>, .../pull/<number> or .../commit/<sha>",
            ),
            TesterError::RateLimited(_) => {
                Some("Set GITHUB_TOKEN or run `integration-tester token set` to raise the limit to 5000/hour")
            }
            TesterError::Unauthorized(_) => {
                Some("The GitHub token is invalid or expired. Run `integration-tester token set <token>`")
            }
            TesterError::ManifestNotFound(_) => {
                Some("Expected structure: custom_components/<domain>/manifest.json")
            }
            TesterError::CoreRequiresPullRequest(_) => {
                Some("Track a pull request URL (https://github.com/<owner>/core/pull/<number>)")
            }
            TesterError::NoIntegrationInDiff(_) => {
                Some("The pull request does not change any directory under homeassistant/components/")
            }
            TesterError::DomainAlreadyTracked { .. } => {
                Some("Remove the existing entry first with `integration-tester remove --domain <domain>`")
            }
            TesterError::UnmanagedDirectory(_) => {
                Some("Pass --overwrite to replace the existing directory")
            }
            TesterError::SelectionRequired(_) => Some("Re-run with --domain <domain>"),
            TesterError::NotTracked(_) => Some("Run `integration-tester list` to see tracked integrations"),
            _ => None,
        }
    }
}

/// Format an error with a suggested remedy when one is known
pub fn format_error_with_help(error: &TesterError) -> String {
    match error.help() {
        Some(help) => format!("Error: {}\n  help: {}", error, help),
        None => format!("Error: {}", error),
    }
}
