use clap::{ArgGroup, Parser, Subcommand};
use integration_tester::core::error_help::format_error_with_help;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "integration-tester")]
#[command(about = "Install integrations from GitHub branches, pull requests and commits, and keep them in sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install an integration from a GitHub URL and start tracking it
    Add {
        /// Repository, branch (/tree/..), pull request (/pull/N) or commit (/commit/SHA) URL
        url: String,
        /// Integration to install when the reference contains several
        #[arg(short, long)]
        domain: Option<String>,
        /// Replace an existing directory that was not installed by this tool
        #[arg(long)]
        overwrite: bool,
        /// Never prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List tracked integrations
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stop tracking an integration
    #[command(group(
        ArgGroup::new("selector")
            .required(true)
            .args(["domain", "url", "owner_repo"]),
    ))]
    Remove {
        /// Integration domain
        #[arg(short, long)]
        domain: Option<String>,
        /// URL the entry was added with
        #[arg(short, long)]
        url: Option<String>,
        /// Repository as owner/repo
        #[arg(long)]
        owner_repo: Option<String>,
        /// Leave the installed files in place
        #[arg(long)]
        keep_files: bool,
    },
    /// Check tracked references for changes now
    Check {
        /// Only check this integration
        domain: Option<String>,
    },
    /// Poll tracked references until interrupted
    Watch,
    /// Acknowledge that a restart happened
    Restarted {
        /// Only acknowledge this integration
        domain: Option<String>,
    },
    /// Show open problems
    Problems {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the GitHub token
    #[command(subcommand)]
    Token(cli::token::TokenCommands),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Add {
            url,
            domain,
            overwrite,
            yes,
        } => {
            cli::add::run(cli::add::AddOptions {
                url,
                domain,
                overwrite,
                yes,
            })
            .await
        }
        Commands::List { json } => cli::list::run(json).await,
        Commands::Remove {
            domain,
            url,
            owner_repo,
            keep_files,
        } => {
            cli::remove::run(cli::remove::RemoveOptions {
                domain,
                url,
                owner_repo,
                keep_files,
            })
            .await
        }
        Commands::Check { domain } => cli::check::run(domain).await,
        Commands::Watch => cli::watch::run().await,
        Commands::Restarted { domain } => cli::restarted::run(domain).await,
        Commands::Problems { json } => cli::problems::run(json),
        Commands::Token(cmd) => cli::token::run(cmd).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n{}", format_error_with_help(&e));
            ExitCode::FAILURE
        }
    }
}
