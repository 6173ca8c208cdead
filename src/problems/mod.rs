//! Operator-visible problem registry

use crate::core::path::{issues_file, locks_dir};
use crate::core::TesterResult;
use crate::di::traits::ProblemSink;
use crate::store::lock::lock_file;
use crate::store::{read_yaml, write_yaml};
use crate::sync::state::ProblemKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One open problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub kind: ProblemKind,
    pub domain: String,
    pub context: String,
    pub raised_at: DateTime<Utc>,
}

impl Problem {
    /// One-line remedy shown next to the problem
    pub fn remedy(&self) -> &'static str {
        match self.kind {
            ProblemKind::DownloadFailed => "check network access and the repository, or run `check` again",
            ProblemKind::PrMerged => "the change is upstream now; remove the entry once released",
            ProblemKind::PrClosed => "remove the entry or track another reference",
            ProblemKind::IntegrationRemovedFromDiff => {
                "the pull request no longer changes this integration; remove the entry"
            }
            ProblemKind::RestartRequired => "restart, then run `restarted`",
            ProblemKind::TokenInvalid => "replace the token with `token set`",
        }
    }
}

/// YAML-persisted problem sink
///
/// At most one problem per `(kind, domain)`; raising an open problem again
/// keeps the original record. Like the entry store, it reads from disk every
/// time and changes the file only under its lock.
pub struct IssueRegistry {
    path: PathBuf,
    lock_path: PathBuf,
}

impl IssueRegistry {
    /// Open the registry in `data_dir`
    pub fn open(data_dir: &Path) -> TesterResult<Self> {
        let registry = Self {
            path: issues_file(data_dir),
            lock_path: locks_dir(data_dir).join("issues.lock"),
        };
        registry.read()?;
        Ok(registry)
    }

    fn read(&self) -> TesterResult<Vec<Problem>> {
        read_yaml(&self.path)
    }

    /// Re-read and apply `change`; the file is rewritten only when it
    /// returns true
    fn update(&self, change: impl FnOnce(&mut Vec<Problem>) -> bool) -> TesterResult<()> {
        let _lock = lock_file(&self.lock_path)?;
        let mut problems = self.read()?;
        if change(&mut problems) {
            write_yaml(&self.path, &problems)?;
        }
        Ok(())
    }
}

impl ProblemSink for IssueRegistry {
    fn raise(&self, kind: ProblemKind, domain: &str, context: &str) -> TesterResult<()> {
        self.update(|problems| {
            if problems.iter().any(|p| p.kind == kind && p.domain == domain) {
                return false;
            }

            tracing::warn!("Problem raised: {} for {}: {}", kind, domain, context);
            problems.push(Problem {
                kind,
                domain: domain.to_string(),
                context: context.to_string(),
                raised_at: Utc::now(),
            });
            true
        })
    }

    fn clear(&self, kind: ProblemKind, domain: &str) -> TesterResult<()> {
        self.update(|problems| {
            let before = problems.len();
            problems.retain(|p| !(p.kind == kind && p.domain == domain));
            if problems.len() == before {
                return false;
            }

            tracing::info!("Problem cleared: {} for {}", kind, domain);
            true
        })
    }

    fn clear_all(&self, domain: &str) -> TesterResult<()> {
        self.update(|problems| {
            let before = problems.len();
            problems.retain(|p| p.domain != domain);
            if problems.len() == before {
                return false;
            }

            tracing::info!("Cleared {} problem(s) for {}", before - problems.len(), domain);
            true
        })
    }

    fn list(&self) -> TesterResult<Vec<Problem>> {
        self.read()
    }
}
