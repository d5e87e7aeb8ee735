//! birdwatch CLI
//!
//! Local entry point: run one-off collection jobs, the HTTP API, or the
//! periodic scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use birdwatch::{
    api::{self, AppState},
    error::Result,
    models::Config,
    storage,
    tasks::{scheduler, Orchestrator},
};

/// birdwatch - Social-media collection service
#[derive(Parser, Debug)]
#[command(name = "birdwatch", version, about = "Social-media collection service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve,

    /// Run the periodic scraping and cleanup scheduler
    Schedule,

    /// Collect tweets for a search query
    ScrapeTweets {
        query: String,
        /// Maximum tweets to collect
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Collect one user profile
    ScrapeUser { username: String },

    /// Collect trending topics for a region
    ScrapeTrends {
        #[arg(default_value = "worldwide")]
        region: String,
    },

    /// Delete records older than the retention window
    Cleanup {
        /// Override the configured retention window, in days
        #[arg(long)]
        days: Option<i64>,
    },

    /// Validate configuration and backend availability
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_result(result: &birdwatch::models::JobResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    config.validate()?;
    let config = Arc::new(config);

    let repo = storage::connect(&config).await?;
    let orchestrator = Arc::new(Orchestrator::from_config(Arc::clone(&config), repo.clone())?);

    match cli.command {
        Command::Serve => {
            let state = Arc::new(AppState {
                orchestrator,
                repo,
            });
            api::serve(state, &config.api).await?;
        }

        Command::Schedule => {
            scheduler::run(orchestrator).await?;
        }

        Command::ScrapeTweets { query, limit } => {
            let result = orchestrator.run_scrape_tweets(&query, limit).await;
            print_result(&result)?;
        }

        Command::ScrapeUser { username } => {
            let result = orchestrator.run_scrape_user(&username).await;
            print_result(&result)?;
        }

        Command::ScrapeTrends { region } => {
            let result = orchestrator.run_scrape_trends(&region).await;
            print_result(&result)?;
        }

        Command::Cleanup { days } => {
            let result = orchestrator.run_cleanup(days).await;
            print_result(&result)?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            // load_or_default already fell back; re-validate the parsed file
            // and report the chain the capability check would build.
            config.validate()?;
            log::info!("✓ Config OK");

            let chain = birdwatch::scrapers::FallbackChain::from_config(&config)?;
            let kinds: Vec<String> = chain.kinds().iter().map(|k| k.to_string()).collect();
            log::info!("✓ Backend chain: {}", kinds.join(" -> "));

            match repo.ping().await {
                Ok(()) => log::info!("✓ Storage reachable"),
                Err(e) => log::warn!("Storage unreachable: {e}"),
            }

            log::info!("All validations passed!");
        }
    }

    Ok(())
}
