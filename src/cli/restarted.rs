use super::open_tracker;
use integration_tester::core::TesterResult;

pub async fn run(domain: Option<String>) -> TesterResult<()> {
    let tracker = open_tracker().await?;
    let acknowledged = tracker.acknowledge_restart(domain.as_deref()).await?;

    if acknowledged.is_empty() {
        println!("No restart was pending.");
    }
    for domain in acknowledged {
        println!("✓ {} is running its installed commit", domain);
    }
    Ok(())
}
