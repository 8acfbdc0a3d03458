//! Sumi-Crawl main entry point
//!
//! This is the command-line interface for the Sumi-Crawl web crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_crawl::config::{parse_config, validate, Config};
use sumi_crawl::crawler::{crawl, CrawlControl, CrawlOptions, CrawlReport};
use sumi_crawl::output::{generate_summary, load_statistics, print_statistics, write_json_summary};
use sumi_crawl::storage::{FrontierStore, SqliteFrontier};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Sumi-Crawl: a polite, resumable web crawler
///
/// Sumi-Crawl crawls websites while respecting robots.txt and per-domain
/// rate limits. Its frontier is durable: an interrupted crawl resumes where
/// it stopped when run again with the same data root.
///
/// While a crawl runs, type `p` (pause), `r` (resume) or `s` (stop) followed
/// by Enter. Ctrl-C stops gracefully.
#[derive(Parser, Debug)]
#[command(name = "sumi-crawl")]
#[command(version)]
#[command(about = "A polite, resumable web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (optional; every key has a default)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seed URL (repeatable); replaces the seeds from the config file
    #[arg(short, long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Page budget
    #[arg(long)]
    max_pages: Option<u64>,

    /// Maximum link depth from the seeds
    #[arg(long)]
    max_depth: Option<u32>,

    /// Number of concurrent workers
    #[arg(long)]
    workers: Option<usize>,

    /// Directory holding state, content and reports
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Discard the frontier and checkpoint and start over
    #[arg(long)]
    restart: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "restart"])]
    stats: bool,

    /// Regenerate the reports from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "restart"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_effective_config(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_crawl(config, cli.restart).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_crawl=info,warn"),
            1 => EnvFilter::new("sumi_crawl=debug,info"),
            2 => EnvFilter::new("sumi_crawl=trace,debug"),
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

/// Reads the config file (if any), applies command-line overrides, validates
fn load_effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };

    if !cli.seeds.is_empty() {
        config.seeds = cli.seeds.clone();
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(max_depth) = cli.max_depth {
        config.crawler.max_depth = max_depth;
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if let Some(data_root) = &cli.data_root {
        config.output.data_root = data_root.clone();
    }

    validate(&config).context("invalid configuration")?;
    Ok(config)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Crawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Page budget: {}", config.crawler.max_pages);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Workers: {}", config.crawler.workers);
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout_sec);
    println!("  Store HTML: {}", config.crawler.store_html);

    println!("\nPoliteness:");
    println!("  Minimum delay: {}ms", config.politeness.min_delay_ms);
    println!(
        "  Per-domain concurrency: {}",
        config.politeness.max_concurrency_per_domain
    );
    println!(
        "  robots.txt: {} (fail {})",
        if config.politeness.respect_robots {
            "respected"
        } else {
            "ignored"
        },
        if config.politeness.robots_fail_open {
            "open"
        } else {
            "closed"
        }
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nData root: {}", config.output.data_root.display());
    println!("  Frontier: {}", config.output.database_path().display());
    println!("  Reports: {}", config.output.reports_dir().display());

    if config.scope.allowed_domains.is_empty() {
        println!("\nScope: seed hosts");
    } else {
        println!("\nScope ({}):", config.scope.allowed_domains.len());
        for pattern in &config.scope.allowed_domains {
            println!("  - {}", pattern);
        }
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

fn open_existing_frontier(config: &Config) -> anyhow::Result<SqliteFrontier> {
    let path = config.output.database_path();
    if !path.exists() {
        bail!("no crawl database at {}", path.display());
    }
    SqliteFrontier::open(&path, config.retry.clone())
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let frontier = open_existing_frontier(config)?;
    println!("Database: {}\n", config.output.database_path().display());

    let stats = load_statistics(&frontier)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --export-summary mode: rewrites the summary from stored data
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    let frontier = open_existing_frontier(config)?;
    let dir = config.output.reports_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let summary = generate_summary(&frontier, None)?;
    write_json_summary(&summary, &dir.join("summary.json"))?;
    sumi_crawl::output::generate_markdown_summary(&summary, &dir.join("summary.md"))?;
    sumi_crawl::output::write_graph_edges(&frontier.links()?, &dir.join("graph_edges.csv"))?;
    sumi_crawl::output::write_crawled(
        &frontier.records()?,
        &dir.join("crawled.csv"),
        &dir.join("crawled.jsonl"),
    )?;

    println!("✓ Reports exported to: {}", dir.display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, restart: bool) -> anyhow::Result<()> {
    if config.seeds.is_empty() {
        tracing::info!("No seeds given, resuming from the existing frontier");
    }

    let control = Arc::new(CrawlControl::new());
    spawn_signal_listener(control.clone());
    spawn_stdin_listener(control.clone());

    let report = crawl(config, CrawlOptions { restart }, &control)
        .await
        .context("crawl failed")?;

    print_report(&report);
    Ok(())
}

/// Ctrl-C requests a graceful stop; a second Ctrl-C exits immediately
fn spawn_signal_listener(control: Arc<CrawlControl>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight pages (press Ctrl-C again to abort)");
            control.stop();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn spawn_stdin_listener(control: Arc<CrawlControl>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "p" | "pause" => control.pause(),
                "r" | "resume" => control.resume(),
                "s" | "stop" => control.stop(),
                "" => {}
                other => tracing::warn!(input = other, "Unknown command (use p, r or s)"),
            }
        }
    });
}

fn print_report(report: &CrawlReport) {
    println!();
    println!("=== Crawl finished: {} ===", report.termination);
    println!("  Done:    {}", report.stats.done);
    println!("  Failed:  {}", report.stats.failed);
    println!("  Skipped: {}", report.stats.skipped);
    println!("  Queued:  {}", report.stats.queued);
    println!("  Links:   {}", report.stats.links);
    println!("  Time:    {:.1}s", report.elapsed_secs);
}
