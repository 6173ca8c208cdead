use super::open_tracker;
use integration_tester::core::{TesterError, TesterResult};
use integration_tester::sync::EntrySelector;

pub struct RemoveOptions {
    pub domain: Option<String>,
    pub url: Option<String>,
    pub owner_repo: Option<String>,
    pub keep_files: bool,
}

pub async fn run(options: RemoveOptions) -> TesterResult<()> {
    let selector = selector(&options)?;
    let tracker = open_tracker().await?;
    let removed = tracker.remove(&selector, options.keep_files).await?;

    println!(
        "✓ Stopped tracking {} ({})",
        removed.integration_domain, removed.tracked_reference
    );
    if options.keep_files {
        println!("  Files kept; the directory is no longer managed.");
    } else {
        println!("  Files removed. Restart to unload the integration.");
    }
    Ok(())
}

fn selector(options: &RemoveOptions) -> TesterResult<EntrySelector> {
    match (&options.domain, &options.url, &options.owner_repo) {
        (Some(domain), None, None) => Ok(EntrySelector::Domain(domain.clone())),
        (None, Some(url), None) => Ok(EntrySelector::Url(url.clone())),
        (None, None, Some(name)) => Ok(EntrySelector::OwnerRepo(name.clone())),
        _ => Err(TesterError::Config(
            "Pass exactly one of --domain, --url or --owner-repo".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(domain: Option<&str>, url: Option<&str>, owner_repo: Option<&str>) -> RemoveOptions {
        RemoveOptions {
            domain: domain.map(String::from),
            url: url.map(String::from),
            owner_repo: owner_repo.map(String::from),
            keep_files: false,
        }
    }

    #[test]
    fn test_selector_requires_exactly_one() {
        assert_eq!(
            selector(&options(Some("demo"), None, None)).unwrap(),
            EntrySelector::Domain("demo".into())
        );
        assert_eq!(
            selector(&options(None, None, Some("owner/repo"))).unwrap(),
            EntrySelector::OwnerRepo("owner/repo".into())
        );
        assert!(selector(&options(None, None, None)).is_err());
        assert!(selector(&options(Some("demo"), Some("https://github.com/o/r"), None)).is_err());
    }
}
