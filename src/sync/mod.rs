//! Keeping installed integrations in line with their tracked references

pub mod machine;
pub mod scheduler;
pub mod state;
pub mod tracker;

pub use machine::{decide, fold_failure, fold_install_failure, Action, CycleFailure, CycleInput, Decision};
pub use scheduler::Scheduler;
pub use state::{InstallationState, LastSeen, ProblemKind};
pub use tracker::{select_domain, CycleReport, EntrySelector, ReconcileReport, SetupPlan, Tracker};
