use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use feedrelay::config::Config;
use feedrelay::feed::FeedCollector;
use feedrelay::notify::DiscordNotifier;
use feedrelay::sync::{NotifyMode, SyncOrchestrator};

/// Exit status when some categories or notifications failed but the cycle
/// completed.
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "feedrelay",
    version,
    about = "Collect RSS feeds into JSON archives and announce new articles to Discord"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "FILE", default_value = "feedrelay.toml")]
    config: PathBuf,

    /// Fetch and store articles without sending or recording notifications
    #[arg(long, conflicts_with = "seed_history")]
    no_notify: bool,

    /// Record every current article as posted without sending anything
    #[arg(long)]
    seed_history: bool,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn mode(&self) -> NotifyMode {
        if self.seed_history {
            NotifyMode::SeedHistory
        } else if self.no_notify {
            NotifyMode::Skip
        } else {
            NotifyMode::Send
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    if config.categories.is_empty() {
        tracing::warn!("No categories configured, nothing to do");
    }

    let client = feedrelay::http::build_client().context("Failed to build HTTP client")?;
    let collector = FeedCollector::new(client.clone(), config.fetch_timeout());
    let notifier = Arc::new(DiscordNotifier::new(client));

    let report = SyncOrchestrator::from_config(&config, collector, notifier)
        .with_mode(args.mode())
        .run()
        .await;

    // Without history on disk the next run would announce everything again.
    report.history.as_ref().map_err(|e| anyhow::anyhow!("Failed to save post history: {}", e))?;
    report.index.as_ref().map_err(|e| anyhow::anyhow!("Failed to write index: {}", e))?;

    for category in &report.categories {
        if let Some(error) = &category.error {
            tracing::warn!(category = %category.id, error = %error, "Category incomplete");
        }
    }

    if report.is_partial() {
        Ok(ExitCode::from(EXIT_PARTIAL))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
