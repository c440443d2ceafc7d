//! # Web News Scraper
//!
//! Scrapes Indonesian news listings and company directories into
//! deduplicated, categorized JSON batches.
//!
//! ## Usage
//!
//! ```sh
//! web_news_scraper news              # every 5 minutes until Ctrl-C
//! web_news_scraper news --once
//! web_news_scraper -o ./data companies
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: one task per source URL with retry, backoff and header rotation
//! 2. **Extraction**: selector cascades turn listing blocks into records
//! 3. **Merge**: a bounded FIFO cache drops repeats across the whole run
//! 4. **Output**: one pretty-printed JSON batch per cycle

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod config;
mod error;
mod fetcher;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod scrapers;
mod utils;

use cache::DedupCache;
use cli::{Cli, Command};
use config::ScraperConfig;
use fetcher::Fetcher;
use models::{ArticleBatch, CompanyBatch};
use outputs::json;
use pipeline::{CompanyPipeline, NewsPipeline};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("web_news_scraper starting up");

    let args = Cli::parse();
    debug!(?args.config, %args.output_dir, ?args.command, "Parsed CLI arguments");

    let config = ScraperConfig::load(args.config.as_deref())?;

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; shutting down");
            signal_token.cancel();
        }
    });

    let fetcher = Fetcher::new(&config.fetch, shutdown.clone())?;

    match args.command {
        Command::News {
            once,
            interval_secs,
        } => {
            run_news(
                &fetcher,
                &config,
                &args.output_dir,
                once,
                Duration::from_secs(interval_secs),
                &shutdown,
            )
            .await;
        }
        Command::Companies => run_companies(&fetcher, &config, &args.output_dir).await,
    }

    fetcher.close();

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// News cycles until `once` is done or shutdown. The cache lives across
/// cycles so an article is only ever written once per process.
#[instrument(level = "info", skip_all, fields(once = once, interval = ?interval))]
async fn run_news(
    fetcher: &Fetcher,
    config: &ScraperConfig,
    output_dir: &str,
    once: bool,
    interval: Duration,
    shutdown: &CancellationToken,
) {
    let pipeline = NewsPipeline::new(fetcher, &config.news);
    let mut cache = DedupCache::new(config.cache_capacity);
    let mut cycle = 0u64;
    debug!(capacity = cache.capacity(), "Article cache ready");

    loop {
        cycle += 1;
        info!(cycle, at = %Local::now().to_rfc3339(), "Starting news cycle");

        match pipeline.run_cycle(&mut cache).await {
            Some(batch) => write_articles(&batch, output_dir).await,
            None => break,
        }

        if once {
            break;
        }
        info!(?interval, "Waiting for next cycle");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn write_articles(batch: &ArticleBatch, output_dir: &str) {
    match json::write_batch(batch, output_dir, "articles").await {
        Ok(path) => {
            info!(
                path = %path.display(),
                total = batch.metadata.total_articles,
                "Article batch saved"
            );
            for (category, summary) in &batch.metadata.categories {
                info!(
                    %category,
                    articles = summary.count,
                    sources = summary.sources.len(),
                    "Category summary"
                );
            }
        }
        Err(e) => error!(error = %e, "Failed to write article batch"),
    }
}

#[instrument(level = "info", skip_all)]
async fn run_companies(fetcher: &Fetcher, config: &ScraperConfig, output_dir: &str) {
    let pipeline = CompanyPipeline::new(fetcher, &config.companies);
    let mut cache = DedupCache::new(config.cache_capacity);
    debug!(capacity = cache.capacity(), "Company cache ready");

    if let Some(batch) = pipeline.run(&mut cache).await {
        write_companies(&batch, output_dir).await;
    }
}

async fn write_companies(batch: &CompanyBatch, output_dir: &str) {
    match json::write_batch(batch, output_dir, "companies").await {
        Ok(path) => info!(
            path = %path.display(),
            total = batch.metadata.total_companies,
            location = %batch.metadata.location,
            sources = ?batch.metadata.data_sources,
            "Company batch saved"
        ),
        Err(e) => error!(error = %e, "Failed to write company batch"),
    }
}
