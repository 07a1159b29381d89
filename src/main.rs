//! Leadcrawl-Fetch main entry point
//!
//! Fetches URLs through the polite fetch layer and prints one line per result.

use anyhow::Context;
use clap::Parser;
use leadcrawl_fetch::config::{load_config_with_hash, Config};
use leadcrawl_fetch::FetchClient;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Leadcrawl-Fetch: polite, cache-aware page fetcher
///
/// Respects robots.txt, revalidates cached pages with conditional requests,
/// paces requests per host and backs off from anti-automation responses.
#[derive(Parser, Debug)]
#[command(name = "leadcrawl-fetch")]
#[command(version)]
#[command(about = "Polite, cache-aware page fetcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to fetch, in order
    #[arg(value_name = "URL", required_unless_present = "dry_run")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Abandon any single fetch that takes longer than this many seconds
    #[arg(long, value_name = "SECS")]
    deadline_secs: Option<f64>,

    /// Validate config and show the effective settings without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        print_settings(&config);
        return Ok(());
    }

    let deadline = cli
        .deadline_secs
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("--deadline-secs must be a non-negative number")?;

    handle_fetch(config, &cli.urls, deadline).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("leadcrawl_fetch=info,warn"),
            1 => EnvFilter::new("leadcrawl_fetch=debug,info"),
            2 => EnvFilter::new("leadcrawl_fetch=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn print_settings(config: &Config) {
    println!("=== Leadcrawl-Fetch Dry Run ===\n");

    println!("User Agent:");
    println!("  Header: {}", config.user_agent.header_value());
    println!("  Robots token: {}", config.user_agent.product_token());

    println!("\nCache:");
    println!("  Default TTL: {}s", config.cache.default_ttl_secs);
    println!("  Max body: {} bytes", config.cache.max_body_bytes);
    println!(
        "  Cacheable types: {}",
        config.cache.cacheable_content_types.join(", ")
    );

    println!("\nRobots:");
    println!("  Default crawl-delay: {}s", config.robots.default_crawl_delay);
    println!("  Policy TTL: {}s", config.robots.policy_ttl_secs);
    println!("  Deny TTL: {}s", config.robots.deny_ttl_secs);

    println!("\nThrottle:");
    println!(
        "  WAF backoff: {}s doubling up to {}s",
        config.throttle.base_backoff_secs, config.throttle.max_backoff_secs
    );

    println!("\nFetch:");
    println!("  Max attempts: {}", config.fetch.max_attempts);
    println!("  Retry base: {}s", config.fetch.retry_base_secs);
    println!("  Request timeout: {}s", config.fetch.request_timeout_secs);

    println!("\n✓ Configuration is valid");
}

/// Fetches every URL sequentially and prints a summary line for each
async fn handle_fetch(
    config: Config,
    urls: &[String],
    deadline: Option<Duration>,
) -> anyhow::Result<()> {
    let client = FetchClient::new(config).context("failed to build fetch client")?;

    for url in urls {
        let outcome = match deadline {
            Some(deadline) => client.fetch_with_deadline(url, deadline).await,
            None => client.fetch(url).await,
        };

        match outcome {
            Ok(result) => println!(
                "{} {} {} {} {}",
                result.status,
                result.reason,
                result.from_cache,
                result.body_len(),
                result.url
            ),
            Err(e) => tracing::error!("{}: {}", url, e),
        }
    }

    client.close();
    Ok(())
}
