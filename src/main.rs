//! Theme Harvester main entry point
//!
//! This is the command-line interface for the marketplace theme harvester.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use theme_harvester::browser::{ChromeSessionFactory, SessionFactory};
use theme_harvester::config::{load_config_with_hash, Config};
use theme_harvester::crawler::{collect_listing_urls, Coordinator, RunMode};
use theme_harvester::output::{
    load_statistics, print_statistics, Document, DocumentWriter, JsonDocumentWriter,
    THEME_URLS_FILE,
};
use tracing_subscriber::EnvFilter;

/// Theme Harvester: collects color themes from the extension marketplace
///
/// Theme Harvester scrapes listing metadata, downloads theme packages with a
/// headless browser, and extracts the color-theme documents they contribute.
/// Failed packages are recorded with a reason and can be retried later.
#[derive(Parser, Debug)]
#[command(name = "theme-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A marketplace color-theme harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Re-download the retryable packages of the previous run
    #[arg(long)]
    retry_failed: bool,

    /// Validate config and show what would be harvested without starting a browser
    #[arg(long, conflicts_with_all = ["collect_urls", "stats"])]
    dry_run: bool,

    /// Collect listing URLs from the marketplace search page and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    collect_urls: bool,

    /// Show statistics from the output files and exit
    #[arg(long, conflicts_with_all = ["dry_run", "collect_urls"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load and validate configuration
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    // Setup logging based on verbosity
    setup_logging(cli.verbose.max(config.run.verbosity), cli.quiet);
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    let mode = if cli.retry_failed {
        RunMode::RetryFailed
    } else {
        RunMode::from_config(&config)
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(config, mode)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.collect_urls {
        handle_collect_urls(&config).await
    } else {
        handle_harvest(config, mode).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("theme_harvester=info,warn"),
            1 => EnvFilter::new("theme_harvester=debug,info"),
            2 => EnvFilter::new("theme_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: Config, mode: RunMode) -> Result<()> {
    println!("=== Theme Harvester Dry Run ===\n");

    println!("Mode: {:?}", mode);

    println!("\nWorkers:");
    println!("  Metadata scrapers: {}", config.workers.metadata_scrapers);
    println!("  Package analyzers: {}", config.workers.package_analyzers);

    println!("\nStages:");
    println!(
        "  Scrape metadata: {}",
        config.stages.scrape_metadata && mode == RunMode::Normal
    );
    println!("  Analyze packages: {}", config.stages.analyze_packages);
    println!(
        "  Checkpoints: metadata={}, packages={} (every {}ms)",
        config.stages.checkpoint_metadata,
        config.stages.checkpoint_packages,
        config.checkpoint.interval_ms
    );

    println!("\nBrowser:");
    println!("  Headless: {}", config.browser.headless);
    println!("  Page load timeout: {}ms", config.browser.page_load_timeout_ms);
    println!("  Download timeout: {}ms", config.browser.download_timeout_ms);
    println!("  Poll interval: {}ms", config.browser.poll_interval_ms);

    println!("\nPaths:");
    println!("  Data: {}", config.paths.data_dir.display());
    println!("  Log: {}", config.paths.log_dir.display());
    println!("  Temp: {}", config.paths.temp_dir.display());

    let coordinator = Coordinator::new(config, mode);
    match coordinator.load_jobs() {
        Ok(jobs) => {
            println!("\n✓ Configuration is valid");
            println!("✓ Would harvest {} listing URLs", jobs.len());
        }
        Err(e) => {
            println!("\n✓ Configuration is valid");
            println!("✗ No jobs available: {}", e);
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the output files
fn handle_stats(config: &Config) -> Result<()> {
    println!("Data directory: {}\n", config.paths.data_dir.display());

    let stats = load_statistics(&config.paths.data_dir).context("Failed to read output files")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --collect-urls mode: scrolls the search page and saves the listing URLs
async fn handle_collect_urls(config: &Config) -> Result<()> {
    let factory = ChromeSessionFactory::new(config.browser.clone());
    let mut session = factory.open(None).await.context("Failed to start browser")?;

    let collected = collect_listing_urls(session.as_ref(), config).await;
    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close browser: {}", e);
    }
    let urls = collected.context("Failed to collect listing URLs")?;

    let path = JsonDocumentWriter::new(&config.paths.data_dir)
        .write(THEME_URLS_FILE, Document::JobList(&urls))
        .context("Failed to write listing URLs")?;
    println!("✓ Saved {} listing URLs to {}", urls.len(), path.display());

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, mode: RunMode) -> Result<()> {
    tracing::info!(
        "Workers: {} metadata scrapers, {} package analyzers",
        config.workers.metadata_scrapers,
        config.workers.package_analyzers
    );

    let report = Coordinator::new(config, mode)
        .run()
        .await
        .context("Harvest failed")?;

    report.log();
    if report.interrupted {
        tracing::warn!("Run was interrupted; unprocessed jobs were not recorded");
    }

    Ok(())
}
