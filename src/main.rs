//! Insurwatch main entry point
//!
//! This is the command-line interface for crawling insurance news and legal documents.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use insurwatch::config::{load_config_with_hash, Config, SourceKind};
use insurwatch::crawler::{
    build_filter, build_transport, CoordinatorSettings, RunCoordinator, SourceOverrides,
    SourceRegistry,
};
use insurwatch::ingest::{ChatTransformer, DisabledTransformer, IngestionGate, Transformer};
use insurwatch::output::{load_statistics, print_run_result, print_statistics, RECENT_RUNS};
use insurwatch::state::{CrawlType, RunStatus};
use insurwatch::storage::{self, SqliteStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// What to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Legal documents from search-driven sources
    Legal,
    /// News articles from category pages
    News,
    /// Legal documents, then news
    Full,
}

/// Insurwatch: insurance news and regulation crawler
///
/// Crawls the configured sources, keeps items relevant to the insurance industry,
/// skips anything already stored and records an audit entry for every run.
#[derive(Parser, Debug)]
#[command(name = "insurwatch")]
#[command(version = "1.0.0")]
#[command(about = "Insurance news and legal document crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// What to crawl
    #[arg(value_enum, default_value = "full")]
    mode: Mode,

    /// Result pages walked per query on legal sources
    #[arg(long, value_name = "N")]
    legal_pages: Option<u32>,

    /// Maximum articles accepted per news source
    #[arg(long, value_name = "N")]
    news_max: Option<u32>,

    /// Only crawl the named source
    #[arg(long, value_name = "NAME")]
    source: Option<String>,

    /// Fetch with plain HTTP even when a browser renderer is configured
    #[arg(long)]
    no_browser: bool,

    /// Overall time budget of each run, in seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show run history and stored record counts, then exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn overrides(&self) -> SourceOverrides {
        SourceOverrides {
            legal_pages: self.legal_pages,
            news_max: self.news_max,
            only: self.source.clone(),
        }
    }

    fn crawl_types(&self) -> Vec<CrawlType> {
        match self.mode {
            Mode::Legal => vec![CrawlType::LegalDocs],
            Mode::News => vec![CrawlType::NewsArticles],
            Mode::Full => vec![CrawlType::LegalDocs, CrawlType::NewsArticles],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(secs) = cli.timeout_secs {
        config.crawler.run_timeout_secs = secs.max(1);
    }

    if let Some(name) = &cli.source {
        if !config.sources.iter().any(|s| &s.name == name) {
            anyhow::bail!("Unknown source '{}'", name);
        }
    }

    if cli.dry_run {
        handle_dry_run(&cli, &config);
        Ok(())
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&cli, config, config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("insurwatch=info,warn"),
            1 => EnvFilter::new("insurwatch=debug,info"),
            2 => EnvFilter::new("insurwatch=trace,debug"),
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

/// Handles the --dry-run mode: shows the crawl plan without fetching
fn handle_dry_run(cli: &Cli, config: &Config) {
    println!("=== Insurwatch Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!(
        "  Retries: {} (base backoff {}ms)",
        config.crawler.max_retries, config.crawler.retry_base_delay_ms
    );
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!(
        "  Concurrent sources: {}",
        config.crawler.max_concurrent_sources
    );
    println!("  Run timeout: {}s", config.crawler.run_timeout_secs);

    let renderer = if cli.no_browser {
        "http (forced)".to_string()
    } else {
        format!("{:?}", config.transport.renderer).to_lowercase()
    };
    println!("\nTransport: {}", renderer);
    println!("  User agents: {}", config.transport.user_agents.len());
    println!("  Proxies: {}", config.transport.proxies.len());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!(
        "  AI rewrite: {}",
        if config.ingest.ai_rewrite_enabled { "on" } else { "off" }
    );

    let registry = SourceRegistry::from_config(config);
    let overrides = cli.overrides();
    for crawl_type in cli.crawl_types() {
        let sources = registry.select(crawl_type, &overrides);
        println!("\n{} ({} sources):", crawl_type, sources.len());
        for source in &sources {
            match source.kind {
                SourceKind::Legal => {
                    let queries = source
                        .max_queries
                        .map_or(source.queries.len(), |m| source.queries.len().min(m as usize));
                    println!(
                        "  - {} ({}): {} queries x {} pages",
                        source.name, source.display_name, queries, source.max_pages
                    );
                }
                SourceKind::News => {
                    println!(
                        "  - {} ({}): {} categories, max items {}, filter {}",
                        source.name,
                        source.display_name,
                        source.targets.len(),
                        source
                            .max_items
                            .map_or_else(|| "unlimited".to_string(), |m| m.to_string()),
                        if source.filter_enabled() { "on" } else { "off" }
                    );
                }
            }
            for target in &source.targets {
                println!("    * {}", target);
            }
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ {} relevance keywords", config.filter.keywords.len());
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage, RECENT_RUNS)?;
    print_statistics(&stats);

    Ok(())
}

fn build_transformer(config: &Config) -> Result<Arc<dyn Transformer>> {
    if !config.ingest.ai_rewrite_enabled {
        return Ok(Arc::new(DisabledTransformer));
    }
    match ChatTransformer::from_config(&config.ingest)? {
        Some(transformer) => Ok(Arc::new(transformer)),
        None => Ok(Arc::new(DisabledTransformer)),
    }
}

/// Handles the main crawl operation
async fn handle_crawl(cli: &Cli, config: Config, config_hash: String) -> Result<()> {
    let storage = storage::shared(
        SqliteStorage::new(Path::new(&config.output.database_path))
            .context("Failed to open database")?,
    );
    let transport = build_transport(&config, cli.no_browser)?;
    let gate = Arc::new(IngestionGate::new(
        storage.clone(),
        build_transformer(&config)?,
        config.ingest.clone(),
    ));
    let coordinator = RunCoordinator::new(
        storage,
        transport,
        gate,
        build_filter(&config),
        CoordinatorSettings::from_config(&config.crawler),
        config_hash,
    );
    let registry = SourceRegistry::from_config(&config);
    let overrides = cli.overrides();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing with partial results");
                cancel.cancel();
            }
        });
    }

    let mut failures = 0;
    let results = match cli.mode {
        Mode::Full => coordinator.run_full(&registry, &overrides, &cancel).await,
        _ => {
            let mut results = Vec::new();
            for crawl_type in cli.crawl_types() {
                let result = coordinator
                    .run_type(crawl_type, &registry, &overrides, &cancel)
                    .await;
                results.push((crawl_type, result));
            }
            results
        }
    };

    for (crawl_type, result) in results {
        match result {
            Ok(result) => {
                if result.run.status == RunStatus::Failed {
                    failures += 1;
                }
                print_run_result(&result);
            }
            Err(e) => {
                failures += 1;
                tracing::error!(crawl_type = %crawl_type, error = %e, "Crawl run could not be recorded");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} crawl run(s) failed", failures);
    }
    Ok(())
}
