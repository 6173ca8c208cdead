use super::open_tracker;
use dialoguer::{Confirm, Select};
use indicatif::ProgressBar;
use integration_tester::core::{TesterError, TesterResult};
use integration_tester::sync::{select_domain, InstallationState, Tracker};
use std::time::Duration;

// Trait for user input (for dependency injection in tests)
pub trait UserInput {
    fn prompt_confirm(&self, prompt: &str, default: bool) -> TesterResult<bool>;
    fn prompt_select(&self, prompt: &str, items: &[String], default: usize) -> TesterResult<usize>;
}

// Real implementation using dialoguer
pub struct DialoguerInput;

impl UserInput for DialoguerInput {
    fn prompt_confirm(&self, prompt: &str, default: bool) -> TesterResult<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(|e| TesterError::Config(format!("Failed to read input: {}", e)))
    }

    fn prompt_select(&self, prompt: &str, items: &[String], default: usize) -> TesterResult<usize> {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .map_err(|e| TesterError::Config(format!("Failed to read input: {}", e)))
    }
}

pub struct AddOptions {
    pub url: String,
    pub domain: Option<String>,
    pub overwrite: bool,
    /// Never prompt; ambiguity and unmanaged directories become errors
    pub yes: bool,
}

pub async fn run(options: AddOptions) -> TesterResult<()> {
    let tracker = open_tracker().await?;
    let state = run_with_input(&tracker, &options, &DialoguerInput).await?;

    println!(
        "✓ Installed {} from {} at {}",
        state.integration_domain,
        state.tracked_reference,
        state.short_sha()
    );
    println!("⚠ Restart to load it, then run `integration-tester restarted`");
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub async fn run_with_input(
    tracker: &Tracker,
    options: &AddOptions,
    input: &dyn UserInput,
) -> TesterResult<InstallationState> {
    let progress = spinner(format!("Resolving {}", options.url));
    let plan = tracker.prepare(&options.url).await;
    progress.finish_and_clear();
    let plan = plan?;

    let candidates = plan.candidates();
    let requested = match &options.domain {
        Some(domain) => Some(domain.clone()),
        None if candidates.len() > 1 && !options.yes => {
            let choice = input.prompt_select(
                "The pull request changes several integrations. Which one?",
                &candidates,
                0,
            )?;
            candidates.get(choice).cloned()
        }
        None => None,
    };
    let domain = select_domain(&plan.target.candidate_domains, requested.as_deref())?;

    let mut overwrite = options.overwrite;
    if !overwrite && tracker.has_unmanaged_directory(&domain)? {
        if options.yes {
            return Err(TesterError::UnmanagedDirectory(domain));
        }
        let prompt = format!(
            "A '{}' directory already exists and was not installed by integration-tester. Replace it?",
            domain
        );
        overwrite = input.prompt_confirm(&prompt, false)?;
        if !overwrite {
            return Err(TesterError::UnmanagedDirectory(domain));
        }
    }

    let progress = spinner(format!(
        "Installing {} at {}",
        domain,
        plan.target.resolution.commit.short_sha()
    ));
    let state = tracker.setup(&plan, Some(&domain), overwrite).await;
    progress.finish_and_clear();
    state
}
