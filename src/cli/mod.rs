pub mod add;
pub mod check;
pub mod list;
pub mod problems;
pub mod remove;
pub mod restarted;
pub mod token;
pub mod watch;

use integration_tester::core::TesterResult;
use integration_tester::di::ServiceContainer;
use integration_tester::sync::Tracker;

/// Build the production services and bring persisted state in line with disk
pub async fn open_tracker() -> TesterResult<Tracker> {
    let tracker = Tracker::new(ServiceContainer::new()?);
    let report = tracker.reconcile().await?;

    for domain in &report.restored {
        println!("⚠ Restored {} after an interrupted install", domain);
    }
    for domain in &report.recreated {
        println!("⚠ Recovered tracking of {} from its install marker", domain);
    }
    for domain in &report.corrected {
        println!("⚠ {} on disk differs from the record; using the on-disk commit", domain);
    }
    Ok(tracker)
}
