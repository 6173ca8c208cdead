//! The synchronization state machine
//!
//! [`decide`] is a pure function of the persisted state and the outcome of one
//! resolution pass. It never touches the filesystem or the network; the
//! installer adapter carries out the actions it returns.
//!
//! New commits are detected by SHA identity alone. A force-push and a
//! fast-forward look the same: the SHA seen now differs from the SHA
//! installed. No commit history is fetched or compared.

use super::state::{InstallationState, LastSeen, ProblemKind};
use crate::core::TesterError;
use crate::github::types::{short_sha, PrState};
use crate::reference::ResolvedTarget;

/// Why a cycle produced no resolved target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleFailure {
    /// Rate limit, network, timeout, missing archive: counted
    Transient(String),
    /// The provider rejected the token: reported, not counted
    Auth(String),
    /// Local or structural error that retrying will not fix: reported only
    Permanent(String),
}

impl From<&TesterError> for CycleFailure {
    fn from(error: &TesterError) -> Self {
        if error.is_auth() {
            CycleFailure::Auth(error.to_string())
        } else if error.is_transient() {
            CycleFailure::Transient(error.to_string())
        } else {
            CycleFailure::Permanent(error.to_string())
        }
    }
}

impl std::fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleFailure::Transient(reason)
            | CycleFailure::Auth(reason)
            | CycleFailure::Permanent(reason) => f.write_str(reason),
        }
    }
}

/// Input of one cycle
#[derive(Debug, Clone, Copy)]
pub enum CycleInput<'a> {
    Resolved(&'a ResolvedTarget),
    Failed(&'a CycleFailure),
}

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    NoOp,
    Install(ResolvedTarget),
    RaiseProblem(ProblemKind, String),
    ClearProblem(ProblemKind),
}

/// Result of one decision
///
/// `next` assumes every action succeeds. When an install fails the adapter
/// passes the decision through [`fold_install_failure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub next: InstallationState,
    pub actions: Vec<Action>,
}

impl Decision {
    fn new(prior: &InstallationState) -> Self {
        Self {
            next: prior.clone(),
            actions: Vec::new(),
        }
    }

    pub fn install_target(&self) -> Option<&ResolvedTarget> {
        self.actions.iter().find_map(|a| match a {
            Action::Install(target) => Some(target),
            _ => None,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(|a| matches!(a, Action::NoOp))
    }

    pub fn raised(&self) -> impl Iterator<Item = ProblemKind> + '_ {
        self.actions.iter().filter_map(|a| match a {
            Action::RaiseProblem(kind, _) => Some(*kind),
            _ => None,
        })
    }

    pub fn cleared(&self) -> impl Iterator<Item = ProblemKind> + '_ {
        self.actions.iter().filter_map(|a| match a {
            Action::ClearProblem(kind) => Some(*kind),
            _ => None,
        })
    }

    fn raise(&mut self, kind: ProblemKind, context: String) {
        if self.next.open_problems.insert(kind) {
            self.actions.push(Action::RaiseProblem(kind, context));
        }
    }

    fn clear(&mut self, kind: ProblemKind) {
        if self.next.open_problems.remove(&kind) {
            self.actions.push(Action::ClearProblem(kind));
        }
    }

    /// Put `kind` back the way `prior` had it, dropping any transition
    fn revert(&mut self, prior: &InstallationState, kind: ProblemKind) {
        self.actions.retain(|action| match action {
            Action::RaiseProblem(k, _) | Action::ClearProblem(k) => *k != kind,
            _ => true,
        });
        if prior.has_problem(kind) {
            self.next.open_problems.insert(kind);
        } else {
            self.next.open_problems.remove(&kind);
        }
    }

    fn count_failure(&mut self, prior: &InstallationState, failure: &CycleFailure, threshold: u32) {
        match failure {
            CycleFailure::Auth(reason) => {
                self.raise(ProblemKind::TokenInvalid, reason.clone());
            }
            CycleFailure::Transient(reason) => {
                self.next.consecutive_failures = prior.consecutive_failures.saturating_add(1);
                if self.next.consecutive_failures >= threshold {
                    self.raise(
                        ProblemKind::DownloadFailed,
                        format!(
                            "{} consecutive failures, last: {}",
                            self.next.consecutive_failures, reason
                        ),
                    );
                }
            }
            CycleFailure::Permanent(reason) => {
                tracing::debug!("Not counting failure: {}", reason);
            }
        }
    }

    fn finish(mut self) -> Self {
        if self.actions.is_empty() {
            self.actions.push(Action::NoOp);
        }
        self
    }
}

/// Decide what a cycle does
///
/// Rules, in order:
/// 1. A failed cycle only touches the failure counter and token problem.
/// 2. If the tracked domain left the candidate set, raise
///    `IntegrationRemovedFromDiff` and install nothing; files stay on disk.
/// 3. A SHA different from the installed one means install, after which a
///    restart is pending.
/// 4. Pull request state raises `PrMerged`/`PrClosed`, and a reopen clears
///    them. This is evaluated alongside an install.
pub fn decide(prior: &InstallationState, input: CycleInput<'_>, threshold: u32) -> Decision {
    match input {
        CycleInput::Failed(failure) => fold_failure(prior, failure, threshold),
        CycleInput::Resolved(target) => decide_resolved(prior, target),
    }
}

/// Count a failed cycle against the prior state
///
/// Only transient failures move the counter. Token rejections raise
/// `TokenInvalid`; permanent failures leave the state as it was.
pub fn fold_failure(prior: &InstallationState, failure: &CycleFailure, threshold: u32) -> Decision {
    let mut decision = Decision::new(prior);
    decision.count_failure(prior, failure, threshold);
    decision.finish()
}

/// Fold a failed install into the decision that asked for it
///
/// What the resolution learned survives: `last_seen`, pull request and diff
/// transitions. The installed commit, `pending_restart` and
/// `RestartRequired` go back to `prior`, and the failure is counted as if
/// the cycle had failed to resolve.
pub fn fold_install_failure(
    prior: &InstallationState,
    decision: Decision,
    failure: &CycleFailure,
    threshold: u32,
) -> Decision {
    let mut decision = decision;
    decision
        .actions
        .retain(|action| !matches!(action, Action::Install(_) | Action::NoOp));

    decision.next.installed_commit_sha = prior.installed_commit_sha.clone();
    decision.next.pending_restart = prior.pending_restart;
    decision.next.consecutive_failures = prior.consecutive_failures;
    decision.revert(prior, ProblemKind::RestartRequired);
    decision.revert(prior, ProblemKind::DownloadFailed);
    if matches!(failure, CycleFailure::Auth(_)) {
        decision.revert(prior, ProblemKind::TokenInvalid);
    }

    decision.count_failure(prior, failure, threshold);
    decision.finish()
}

fn decide_resolved(prior: &InstallationState, target: &ResolvedTarget) -> Decision {
    let mut decision = Decision::new(prior);
    let domain = &prior.integration_domain;

    decision.next.consecutive_failures = 0;
    decision.clear(ProblemKind::DownloadFailed);
    decision.clear(ProblemKind::TokenInvalid);
    decision.next.last_seen = Some(LastSeen::observed(&target.resolution));

    let in_diff = target.candidate_domains.contains(domain);
    if in_diff {
        decision.clear(ProblemKind::IntegrationRemovedFromDiff);
    } else {
        decision.raise(
            ProblemKind::IntegrationRemovedFromDiff,
            format!(
                "{} no longer changes {} as of {}",
                prior.tracked_reference,
                domain,
                short_sha(target.commit_sha())
            ),
        );
    }

    if in_diff && target.commit_sha() != prior.installed_commit_sha {
        tracing::info!(
            "{}: {} -> {}",
            domain,
            prior.short_sha(),
            short_sha(target.commit_sha())
        );
        decision.actions.push(Action::Install(target.clone()));
        decision.next.installed_commit_sha = target.commit_sha().to_string();
        decision.next.pending_restart = true;
        decision.raise(
            ProblemKind::RestartRequired,
            format!("{} updated to {}", domain, short_sha(target.commit_sha())),
        );
    }

    match target.pr_state() {
        Some(PrState::Merged) => {
            decision.clear(ProblemKind::PrClosed);
            decision.raise(
                ProblemKind::PrMerged,
                format!("{} was merged", prior.tracked_reference),
            );
        }
        Some(PrState::Closed) => {
            decision.raise(
                ProblemKind::PrClosed,
                format!("{} was closed without merging", prior.tracked_reference),
            );
        }
        Some(PrState::Open) => {
            decision.clear(ProblemKind::PrMerged);
            decision.clear(ProblemKind::PrClosed);
        }
        None => {}
    }

    decision.finish()
}
