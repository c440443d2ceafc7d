//! Data models for scraped records and the persisted output batches.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Source`] / [`CompanySource`]: configured endpoints grouped by category or label
//! - [`Article`]: one news item extracted from a page, with its [`ArticleMetadata`]
//! - [`CompanyRecord`]: one company extracted from a directory or job board
//! - [`ArticleBatch`] / [`CompanyBatch`]: the JSON documents written to disk
//! - [`Fingerprint`]: the identity hash used by the deduplication cache
//!
//! Field names follow the snake_case JSON layout consumed downstream.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A named news category and the endpoints polled for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    /// Category label, e.g. "Media Olahraga".
    pub category: String,
    /// Endpoints in polling order.
    pub urls: Vec<String>,
}

/// Layout family of a company source, which selects the extraction cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySourceKind {
    /// Business directory listings (one block per company).
    Directory,
    /// Job board listings (company named inside each vacancy).
    JobBoard,
}

/// A labelled group of company listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompanySource {
    /// Label written into each record's `source` field.
    pub name: String,
    pub kind: CompanySourceKind,
    pub urls: Vec<String>,
}

/// Metadata attached to an extracted article.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleMetadata {
    pub author: String,
    /// ISO `yyyy-mm-dd[ HH:MM]` when recognised, otherwise the raw date text.
    pub published_date: String,
    pub category: String,
    pub description: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub full_content: Option<String>,
}

/// A news article extracted from one content block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Article {
    pub title: String,
    /// Absolute article URL.
    pub url: String,
    /// The listing page the article was found on.
    pub source: String,
    pub metadata: ArticleMetadata,
    /// Extraction time, RFC 3339.
    pub timestamp: String,
}

/// A company extracted from a directory or job listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompanyRecord {
    pub company_name: String,
    pub address: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub hrd_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub industry: Option<String>,
    pub source: String,
    pub scraped_at: String,
}

/// Identity used for deduplication.
///
/// The identity string is hashed with SHA-256; two records with the same
/// identity string always share a fingerprint.
pub trait Fingerprint {
    /// The string that identifies this record.
    fn identity(&self) -> String;

    /// Hex digest of [`identity`](Fingerprint::identity).
    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.identity().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Fingerprint for Article {
    fn identity(&self) -> String {
        format!("{}{}", self.title, self.url)
    }
}

impl Fingerprint for CompanyRecord {
    fn identity(&self) -> String {
        self.company_name.trim().to_lowercase()
    }
}

/// Per-category summary in the article batch metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategorySummary {
    pub count: usize,
    /// Distinct listing pages that contributed to the category, sorted.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleBatchMetadata {
    pub timestamp: String,
    pub total_articles: usize,
    pub categories: BTreeMap<String, CategorySummary>,
}

/// The persisted article document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleBatch {
    pub metadata: ArticleBatchMetadata,
    pub articles: BTreeMap<String, Vec<Article>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompanyBatchMetadata {
    pub timestamp: String,
    pub total_companies: usize,
    pub location: String,
    pub data_sources: Vec<String>,
}

/// The persisted company document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompanyBatch {
    pub metadata: CompanyBatchMetadata,
    pub companies: Vec<CompanyRecord>,
}

#[cfg(test)]
pub(crate) fn sample_article(title: &str, url: &str) -> Article {
    Article {
        title: title.to_string(),
        url: url.to_string(),
        source: "https://www.kompas.com/".to_string(),
        metadata: ArticleMetadata {
            author: "Tidak disebutkan".to_string(),
            published_date: "2025-02-17".to_string(),
            category: "Umum".to_string(),
            description: String::new(),
            location: String::new(),
            full_content: None,
        },
        timestamp: "2025-02-17T10:00:00+07:00".to_string(),
    }
}
