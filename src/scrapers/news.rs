//! News listing extraction.
//!
//! Every candidate block yields at most one [`Article`]. A block whose title
//! or link cannot be found is dropped silently, as is any article whose title
//! and description mention none of the configured keywords.

use super::{
    Cascade, attr_of, attr_or_text, class_hint, compile, find_blocks, own_attr, paragraphs,
    text_of, visible_text,
};
use crate::models::{Article, ArticleMetadata};
use crate::normalize::{clean_text, contains_keywords, extract_location, normalize_url, parse_date};
use chrono::Local;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

pub const DEFAULT_AUTHOR: &str = "Tidak disebutkan";
pub const DEFAULT_CATEGORY: &str = "Umum";

const BLOCK_HINTS: &[&str] = &["article", "news", "post", "berita", "content"];

static BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("article, div, h3").unwrap());
static TITLE_CANDIDATES: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, a").unwrap());

static LINK: Lazy<Cascade> =
    Lazy::new(|| Cascade::new(vec![own_attr("href"), attr_of("a[href]", "href")]));

static AUTHOR: Lazy<Cascade> = Lazy::new(|| {
    Cascade::new(vec![
        text_of(".author-name"),
        text_of(".post-author"),
        text_of(r#"[rel="author"]"#),
        text_of(".byline"),
        text_of(".entry-author"),
        text_of(".penulis"),
        text_of(".journalist"),
        class_hint("span, div, p, a", &["author", "writer", "penulis", "journalist"]),
    ])
});

static DATE: Lazy<Cascade> = Lazy::new(|| {
    const ATTRS: &[&str] = &["datetime", "content"];
    Cascade::new(vec![
        attr_or_text("time.published", ATTRS),
        attr_or_text("time.entry-date", ATTRS),
        attr_or_text("span.post-date", ATTRS),
        attr_or_text(".article-date", ATTRS),
        attr_or_text(r#"meta[property="article:published_time"]"#, ATTRS),
        attr_of("time[datetime]", "datetime"),
        class_hint(
            "time, span, div, p",
            &["date", "time", "tanggal", "waktu", "published"],
        ),
    ])
});

static CATEGORY: Lazy<Cascade> = Lazy::new(|| {
    Cascade::new(vec![
        text_of(".article-category"),
        text_of(".post-category"),
        text_of(".entry-category"),
        text_of(".breadcrumb .category"),
        text_of(".kategori"),
        text_of(".rubrik"),
        class_hint("a, span, div", &["category", "kategori", "rubrik", "kanal"]),
    ])
});

static DESCRIPTION: Lazy<Cascade> = Lazy::new(|| {
    Cascade::new(vec![
        text_of(".article-excerpt"),
        text_of(".post-excerpt"),
        text_of(".entry-summary"),
        attr_or_text(r#"meta[name="description"]"#, &["content"]),
        text_of(".ringkasan"),
        class_hint("p, div", &["desc", "summary", "excerpt", "ringkasan"]),
    ])
});

static BODY_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile(&[
        "div.article-content",
        "div.entry-content",
        "div.post-content",
        "article .content",
        ".body-text",
    ])
});

/// Extract keyword-matching articles from a listing page.
///
/// Candidate blocks are `article`, `div` and `h3` elements whose class
/// mentions one of the block hints. A wrapper block that contains another
/// `article` or `div` candidate which yields an article is skipped, so a `div.content` around a
/// list of cards never borrows fields from the cards inside it.
///
/// # Arguments
///
/// * `html` - Raw listing page markup
/// * `base_url` - URL the page was fetched from; relative links resolve
///   against it and it becomes each article's `source`
/// * `keywords` - An article is kept only when its title or description
///   contains one of these (case-insensitive). An empty list keeps nothing.
///
/// # Returns
///
/// Articles in document order. Blocks without a title or link are dropped.
#[instrument(level = "info", skip_all, fields(%base_url))]
pub fn parse_articles(html: &str, base_url: &str, keywords: &[String]) -> Vec<Article> {
    let document = Html::parse_document(html);
    let timestamp = Local::now().to_rfc3339();
    let blocks = find_blocks(&document, &BLOCKS, BLOCK_HINTS);

    let extracted: Vec<(ElementRef<'_>, Option<Article>)> = blocks
        .iter()
        .map(|block| (*block, extract_article(*block, base_url, &timestamp)))
        .collect();
    // Headline candidates sit inside their own card and never make it a wrapper.
    let productive: HashSet<_> = extracted
        .iter()
        .filter(|(block, article)| article.is_some() && block.value().name() != "h3")
        .map(|(block, _)| block.id())
        .collect();

    let mut articles = Vec::new();
    for (block, article) in extracted {
        let Some(article) = article else {
            continue;
        };
        if block
            .descendants()
            .skip(1)
            .any(|node| productive.contains(&node.id()))
        {
            debug!(title = %article.title, "Wrapper block around other articles; skipping");
            continue;
        }
        let haystack = format!("{} {}", article.title, article.metadata.description);
        if !contains_keywords(&haystack, keywords) {
            debug!(title = %article.title, "No keyword match; skipping");
            continue;
        }
        articles.push(article);
    }

    info!(
        blocks = blocks.len(),
        articles = articles.len(),
        "Parsed listing page"
    );
    articles
}

/// Build an article from one block, or `None` when the title or link is missing.
pub fn extract_article(block: ElementRef<'_>, base_url: &str, timestamp: &str) -> Option<Article> {
    let (title_element, title) = block.select(&TITLE_CANDIDATES).find_map(|el| {
        let title = clean_text(&visible_text(el));
        (!title.is_empty()).then_some((el, title))
    })?;

    let href = LINK.first(title_element).or_else(|| LINK.first(block))?;
    let url = normalize_url(base_url, &href);
    if url.is_empty() {
        return None;
    }

    let raw_description = DESCRIPTION.first(block).unwrap_or_default();
    let raw_date = DATE
        .first(block)
        .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let metadata = ArticleMetadata {
        author: cleaned_or(AUTHOR.first(block), DEFAULT_AUTHOR),
        published_date: parse_date(&raw_date),
        category: cleaned_or(CATEGORY.first(block), DEFAULT_CATEGORY),
        location: extract_location(&raw_description),
        description: clean_text(&raw_description),
        full_content: full_content(block),
    };

    Some(Article {
        title,
        url,
        source: base_url.to_string(),
        metadata,
        timestamp: timestamp.to_string(),
    })
}

fn cleaned_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| clean_text(&v))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Newline-joined paragraphs of the first body container that has any.
fn full_content(block: ElementRef<'_>) -> Option<String> {
    BODY_CONTAINERS.iter().find_map(|selector| {
        let container = block.select(selector).next()?;
        let text = paragraphs(container).join("\n");
        (!text.trim().is_empty()).then_some(text)
    })
}
