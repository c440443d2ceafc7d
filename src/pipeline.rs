//! Fetch, extract, deduplicate and batch.
//!
//! Each source group (a news category or a company source) is fetched with
//! one task per URL, all running concurrently on the current task. Once every
//! task in the group has finished, results are merged sequentially through
//! the [`DedupCache`], which is the only mutable state shared across tasks.
//!
//! A failing URL contributes no items and never aborts its siblings.

use crate::cache::DedupCache;
use crate::config::{CompanyConfig, NewsConfig};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::models::{
    Article, ArticleBatch, ArticleBatchMetadata, CategorySummary, CompanyBatch,
    CompanyBatchMetadata, CompanyRecord, CompanySource, Source,
};
use crate::scrapers::company::parse_companies;
use crate::scrapers::news::parse_articles;
use chrono::Local;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Bucket for articles whose source matches no configured category.
pub const OTHER_CATEGORY: &str = "Lainnya";

/// Fetch one page, then hold the rate-limit delay. Failures are logged and
/// turned into `None`.
async fn fetch_page(fetcher: &Fetcher, url: &str, delay: Duration) -> Option<String> {
    let html = match fetcher.fetch(url).await {
        Ok(html) => html,
        Err(FetchError::Cancelled { .. }) => {
            debug!(%url, "Fetch cancelled");
            return None;
        }
        Err(FetchError::Skipped { .. }) => return None,
        Err(e) => {
            error!(%url, error = %e, "Source failed; contributing no items");
            return None;
        }
    };
    if !delay.is_zero() && fetcher.pause(url, delay).await.is_err() {
        debug!(%url, "Rate-limit pause interrupted by shutdown");
    }
    Some(html)
}

pub struct NewsPipeline<'a> {
    fetcher: &'a Fetcher,
    config: &'a NewsConfig,
}

impl<'a> NewsPipeline<'a> {
    pub fn new(fetcher: &'a Fetcher, config: &'a NewsConfig) -> Self {
        Self { fetcher, config }
    }

    /// Articles from one listing page; empty on any failure.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn scrape_source(&self, url: &str) -> Vec<Article> {
        match fetch_page(self.fetcher, url, self.config.rate_limit_delay()).await {
            Some(html) => parse_articles(&html, url, &self.config.keywords),
            None => Vec::new(),
        }
    }

    /// Every configured source, one category at a time.
    pub async fn scrape_all(&self) -> Vec<Article> {
        let mut all = Vec::new();
        for source in &self.config.sources {
            let per_url: Vec<Vec<Article>> = stream::iter(&source.urls)
                .map(|url| self.scrape_source(url))
                .buffered(source.urls.len().max(1))
                .collect()
                .await;
            let found: usize = per_url.iter().map(Vec::len).sum();
            info!(category = %source.category, urls = source.urls.len(), articles = found, "Category scraped");
            all.extend(per_url.into_iter().flatten());
        }
        all
    }

    /// One full cycle over every configured category.
    ///
    /// URLs within a category are fetched concurrently. Once they have all
    /// finished, results are merged through `cache`, which keeps its
    /// contents between cycles.
    ///
    /// # Arguments
    ///
    /// * `cache` - Deduplication cache shared by every cycle of the run
    ///
    /// # Returns
    ///
    /// The categorized batch, or `None` when shutdown was requested during
    /// the cycle so a partial batch is never persisted.
    #[instrument(level = "info", skip_all)]
    pub async fn run_cycle(&self, cache: &mut DedupCache<Article>) -> Option<ArticleBatch> {
        let scraped = self.scrape_all().await;
        if self.fetcher.shutdown_token().is_cancelled() {
            warn!(scraped = scraped.len(), "Shutdown requested; discarding cycle");
            return None;
        }
        Some(merge_articles(&self.config.sources, scraped, cache))
    }
}

/// Name of the first category with a configured URL contained in
/// `source_url`, else [`OTHER_CATEGORY`].
pub fn categorize(source_url: &str, sources: &[Source]) -> String {
    sources
        .iter()
        .find(|s| s.urls.iter().any(|u| source_url.contains(u.as_str())))
        .map(|s| s.category.clone())
        .unwrap_or_else(|| OTHER_CATEGORY.to_string())
}

/// Drop articles already in `cache`, record the rest, and group them by
/// category.
///
/// # Arguments
///
/// * `sources` - Category table used by [`categorize`]
/// * `articles` - Scraped articles in source order
/// * `cache` - Deduplication cache; every kept article is added to it
///
/// # Returns
///
/// An [`ArticleBatch`] whose metadata carries the total, and per category
/// the article count and the sorted distinct source URLs.
pub fn merge_articles(
    sources: &[Source],
    articles: Vec<Article>,
    cache: &mut DedupCache<Article>,
) -> ArticleBatch {
    let mut grouped: BTreeMap<String, Vec<Article>> = BTreeMap::new();
    let mut duplicates = 0usize;
    for article in articles {
        if cache.is_duplicate(&article) {
            duplicates += 1;
            continue;
        }
        cache.add(article.clone());
        grouped
            .entry(categorize(&article.source, sources))
            .or_default()
            .push(article);
    }

    let categories: BTreeMap<String, CategorySummary> = grouped
        .iter()
        .map(|(category, items)| {
            let summary = CategorySummary {
                count: items.len(),
                sources: items.iter().map(|a| a.source.clone()).unique().sorted().collect(),
            };
            (category.clone(), summary)
        })
        .collect();
    let total_articles = categories.values().map(|c| c.count).sum();
    debug!(total_articles, duplicates, cached = cache.len(), "Merged articles");

    ArticleBatch {
        metadata: ArticleBatchMetadata {
            timestamp: Local::now().to_rfc3339(),
            total_articles,
            categories,
        },
        articles: grouped,
    }
}

pub struct CompanyPipeline<'a> {
    fetcher: &'a Fetcher,
    config: &'a CompanyConfig,
}

impl<'a> CompanyPipeline<'a> {
    pub fn new(fetcher: &'a Fetcher, config: &'a CompanyConfig) -> Self {
        Self { fetcher, config }
    }

    #[instrument(level = "info", skip_all, fields(source = %source.name, %url))]
    pub async fn scrape_source(&self, source: &CompanySource, url: &str) -> Vec<CompanyRecord> {
        match fetch_page(self.fetcher, url, self.config.rate_limit_delay()).await {
            Some(html) => parse_companies(&html, source, self.config),
            None => Vec::new(),
        }
    }

    pub async fn scrape_all(&self) -> Vec<CompanyRecord> {
        let mut all = Vec::new();
        for source in &self.config.sources {
            let per_url: Vec<Vec<CompanyRecord>> = stream::iter(&source.urls)
                .map(|url| self.scrape_source(source, url))
                .buffered(source.urls.len().max(1))
                .collect()
                .await;
            let found: usize = per_url.iter().map(Vec::len).sum();
            info!(source = %source.name, urls = source.urls.len(), companies = found, "Company source scraped");
            all.extend(per_url.into_iter().flatten());
        }
        all
    }

    /// Single pass over every company source. `None` on shutdown.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self, cache: &mut DedupCache<CompanyRecord>) -> Option<CompanyBatch> {
        let scraped = self.scrape_all().await;
        if self.fetcher.shutdown_token().is_cancelled() {
            warn!(scraped = scraped.len(), "Shutdown requested; discarding run");
            return None;
        }
        Some(merge_companies(&self.config.location, scraped, cache))
    }
}

/// Drop companies whose normalized name is already cached and wrap the
/// rest in a batch.
pub fn merge_companies(
    location: &str,
    records: Vec<CompanyRecord>,
    cache: &mut DedupCache<CompanyRecord>,
) -> CompanyBatch {
    let mut companies = Vec::new();
    for record in records {
        if cache.is_duplicate(&record) {
            debug!(company = %record.company_name, "Duplicate company; skipping");
            continue;
        }
        cache.add(record.clone());
        companies.push(record);
    }

    let data_sources = companies
        .iter()
        .map(|c| c.source.clone())
        .unique()
        .sorted()
        .collect();

    CompanyBatch {
        metadata: CompanyBatchMetadata {
            timestamp: Local::now().to_rfc3339(),
            total_companies: companies.len(),
            location: location.to_string(),
            data_sources,
        },
        companies,
    }
}
