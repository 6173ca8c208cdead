use super::open_tracker;
use integration_tester::core::TesterResult;
use integration_tester::sync::Scheduler;
use std::sync::Arc;

pub async fn run() -> TesterResult<()> {
    let tracker = Arc::new(open_tracker().await?);
    let interval = tracker.services().config().poll_interval();

    let polled = tracker
        .entries()?
        .iter()
        .filter(|state| state.tracked_reference.is_polled())
        .count();
    println!(
        "Watching {} entr{} every {}s (Ctrl-C to stop)",
        polled,
        if polled == 1 { "y" } else { "ies" },
        interval.as_secs()
    );
    if polled == 0 {
        println!("Branches and pull requests added with `add` are picked up while watching.");
    }

    Scheduler::new(tracker, interval)
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    println!("\n✓ Stopped watching");
    Ok(())
}
