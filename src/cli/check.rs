use super::open_tracker;
use integration_tester::core::TesterResult;
use integration_tester::sync::CycleReport;

pub async fn run(domain: Option<String>) -> TesterResult<()> {
    let tracker = open_tracker().await?;

    match domain {
        Some(domain) => {
            let report = tracker.check(&domain).await?;
            print_report(&report);
        }
        None => {
            let reports = tracker.check_all().await?;
            if reports.is_empty() {
                println!("No integrations are tracked.");
            }
            for (domain, report) in reports {
                match report {
                    Ok(report) => print_report(&report),
                    Err(e) => println!("⚠ {}: {}", domain, e),
                }
            }
        }
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    for line in summarize(report) {
        println!("{}", line);
    }
}

pub(crate) fn summarize(report: &CycleReport) -> Vec<String> {
    let domain = &report.domain;
    let mut lines = Vec::new();

    match (&report.installed, &report.failure) {
        (Some(_), _) => lines.push(format!(
            "✓ {}: installed {} (restart required)",
            domain,
            report.state.short_sha()
        )),
        (None, Some(failure)) => lines.push(format!(
            "⚠ {}: {} ({} consecutive failures)",
            domain, failure, report.state.consecutive_failures
        )),
        (None, None) => lines.push(format!(
            "✓ {}: up to date at {}",
            domain,
            report.state.short_sha()
        )),
    }

    for kind in &report.raised {
        lines.push(format!("  ⚠ problem raised: {}", kind));
    }
    for kind in &report.cleared {
        lines.push(format!("  ✓ problem cleared: {}", kind));
    }
    lines
}
