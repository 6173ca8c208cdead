use super::open_tracker;
use integration_tester::core::TesterResult;
use integration_tester::sync::InstallationState;

pub async fn run(json: bool) -> TesterResult<()> {
    let tracker = open_tracker().await?;
    let entries = tracker.entries()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No integrations are tracked.");
        return Ok(());
    }

    for (i, state) in entries.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for line in describe(state) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Human-readable lines for one entry
pub(crate) fn describe(state: &InstallationState) -> Vec<String> {
    let mut lines = vec![match &state.integration_name {
        Some(name) => format!(
            "{} ({})  {}",
            state.integration_domain, name, state.tracked_reference
        ),
        None => format!("{}  {}", state.integration_domain, state.tracked_reference),
    }];

    let restart = if state.pending_restart {
        " (restart pending)"
    } else {
        ""
    };
    lines.push(format!("  installed: {}{}", state.short_sha(), restart));

    if !state.open_problems.is_empty() {
        let problems: Vec<&str> = state.open_problems.iter().map(|k| k.as_str()).collect();
        lines.push(format!("  ⚠ problems: {}", problems.join(", ")));
    }

    if let Some(seen) = &state.last_seen {
        if let Some(pr) = &seen.pull_request {
            lines.push(format!(
                "  pull request: #{} \"{}\" by {} ({})",
                pr.number, pr.title, pr.author, pr.state
            ));
            lines.push(format!("  branches: {} → {}", pr.head_ref, pr.base_ref));
            lines.push(format!("  pull request url: {}", pr.html_url));
        }
        if let Some(url) = state.branch_url() {
            lines.push(format!("  branch url: {}", url));
        }
        lines.push(format!(
            "  last seen: {} \"{}\" by {}, checked {}",
            seen.commit.short_sha(),
            seen.commit.message,
            seen.commit.author,
            seen.checked_at.format("%Y-%m-%d %H:%M UTC")
        ));
        if !seen.commit.html_url.is_empty() {
            lines.push(format!("  commit url: {}", seen.commit.html_url));
        }
    }
    lines
}
