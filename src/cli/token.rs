use clap::Subcommand;
use dialoguer::Password;
use integration_tester::cache::Cache;
use integration_tester::config::Config;
use integration_tester::core::credentials::GITHUB_TOKEN_KEY;
use integration_tester::core::{CredentialStore, TesterError, TesterResult};
use integration_tester::di::CacheProvider;
use integration_tester::github::{resolve_token, GitHubClient};
use std::sync::Arc;

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Store a GitHub token in the OS keychain
    Set {
        /// Token value (prompted for when omitted)
        token: Option<String>,
    },
    /// Delete the stored token
    Clear,
    /// Show where the token comes from and whether GitHub accepts it
    Status,
}

pub async fn run(command: TokenCommands) -> TesterResult<()> {
    match command {
        TokenCommands::Set { token } => set(token),
        TokenCommands::Clear => clear(),
        TokenCommands::Status => status().await,
    }
}

fn set(token: Option<String>) -> TesterResult<()> {
    let token = match token {
        Some(token) => token,
        None => Password::new()
            .with_prompt("GitHub token")
            .interact()
            .map_err(|e| TesterError::Config(format!("Failed to read input: {}", e)))?,
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(TesterError::Config("Token cannot be empty".to_string()));
    }

    CredentialStore::store(GITHUB_TOKEN_KEY, token)?;
    println!("✓ Token stored securely");
    Ok(())
}

fn clear() -> TesterResult<()> {
    if !CredentialStore::exists(GITHUB_TOKEN_KEY) {
        println!("No token stored.");
        return Ok(());
    }
    CredentialStore::delete(GITHUB_TOKEN_KEY)?;
    println!("✓ Token removed");
    Ok(())
}

async fn status() -> TesterResult<()> {
    let config = Config::load()?;
    println!("Token source: {}", token_source(&config));

    let token = resolve_token(&config);
    let cache: Arc<dyn CacheProvider> = Arc::new(Cache::new(config.get_cache_dir()?)?);
    let client = GitHubClient::new(&config, token.clone(), cache)?;

    let limit = client.rate_limit().await?;
    println!("Rate limit: {}/{} remaining", limit.remaining, limit.limit);

    match token {
        None => println!("⚠ Anonymous access only; set a token to raise the limit"),
        Some(_) if client.validate_token().await? => println!("✓ Token accepted"),
        Some(_) => {
            return Err(TesterError::Unauthorized(
                "the token is not recognised by GitHub".to_string(),
            ))
        }
    }
    Ok(())
}

fn token_source(config: &Config) -> &'static str {
    if std::env::var("GITHUB_TOKEN").map(|t| !t.is_empty()).unwrap_or(false) {
        "GITHUB_TOKEN environment variable"
    } else if CredentialStore::exists(GITHUB_TOKEN_KEY) {
        "OS keychain"
    } else if config.github_token.is_some() {
        "config file"
    } else {
        "none"
    }
}
