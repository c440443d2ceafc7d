//! Company directory and job-board extraction.
//!
//! A record needs a company name; everything else is best effort. Contact
//! details are pulled from the block's visible text plus any `mailto:` and
//! `tel:` links, and deduplicated as sets.

use super::{Cascade, class_hint, find_blocks, text_nodes, text_of, visible_text};
use crate::config::CompanyConfig;
use crate::models::{CompanyRecord, CompanySource, CompanySourceKind};
use crate::normalize::collapse_whitespace;
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, instrument};

const DIRECTORY_HINTS: &[&str] = &["listing", "company", "business", "result"];
const JOB_HINTS: &[&str] = &["job", "vacancy", "listing", "result"];

/// Substrings that mark an address as a placeholder or unattended inbox.
const EMAIL_BLACKLIST: &[&str] = &["noreply", "no-reply", "admin", "@example.", "@domain."];
/// Asset names like `logo@2x.png` look like addresses to the pattern.
const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

const MIN_PHONE_DIGITS: usize = 10;

static BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("div, article").unwrap());
static CONTACT_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="mailto:"], a[href^="tel:"]"#).unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
static PHONES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\+62\s?[\d\s\-]{8,15}",
        r"08[\d\s\-]{8,12}",
        r"\(021\)[\d\s\-]{7,10}",
        r"\(0\d{2,3}\)[\d\s\-]{6,10}",
        r"021[\d\s\-]{7,10}",
        r"0\d{2,3}[\d\s\-]{6,10}",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static PHONE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-()]").unwrap());
static HRD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:hrd|hr|human resources?|personalia|sdm|recruiter|rekrutmen)\b[^:\n]{0,20}:\s*(?P<name>[^\d@:|,;()]*)",
    )
    .unwrap()
});

static DIRECTORY_NAME: Lazy<Cascade> = Lazy::new(|| {
    Cascade::new(vec![
        class_hint("h1, h2, h3, h4, a", &["name", "title", "company"]),
        text_of("h1, h2, h3, h4"),
    ])
});

static JOB_NAME: Lazy<Cascade> =
    Lazy::new(|| Cascade::new(vec![class_hint("span, div, a, p", &["company", "employer", "firm"])]));

static INDUSTRY: Lazy<Cascade> = Lazy::new(|| {
    Cascade::new(vec![
        text_of(".industry"),
        text_of(".kategori"),
        text_of(".category"),
        class_hint("span, div, p, a", &["industry", "industri", "sector", "sektor", "bidang"]),
    ])
});

/// Extract company records from one page of `source`.
///
/// Only the innermost matching blocks are read, so a wrapper list never
/// absorbs the contacts of every entry it contains. Blocks without a name
/// are dropped.
///
/// # Arguments
///
/// * `html` - Raw page body
/// * `source` - Directory or job board the page came from; its name and kind
///   are stamped on every record
/// * `config` - Company settings supplying the address hint
///
/// # Returns
///
/// Records in document order. Email and phone lists are deduplicated and
/// sorted. Missing fields are empty strings or empty lists.
#[instrument(level = "info", skip_all, fields(source = %source.name))]
pub fn parse_companies(html: &str, source: &CompanySource, config: &CompanyConfig) -> Vec<CompanyRecord> {
    let document = Html::parse_document(html);
    let scraped_at = Local::now().to_rfc3339();
    let (hints, name_cascade) = match source.kind {
        CompanySourceKind::Directory => (DIRECTORY_HINTS, &*DIRECTORY_NAME),
        CompanySourceKind::JobBoard => (JOB_HINTS, &*JOB_NAME),
    };

    let blocks = innermost(find_blocks(&document, &BLOCKS, hints));
    let records: Vec<CompanyRecord> = blocks
        .iter()
        .filter_map(|block| extract_company(*block, name_cascade, source, config, &scraped_at))
        .collect();

    info!(
        blocks = blocks.len(),
        companies = records.len(),
        "Parsed company page"
    );
    records
}

/// Drop blocks that contain another candidate block, so a wrapper such as
/// `div.company-list` does not swallow the contacts of every entry inside it.
fn innermost(blocks: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids: HashSet<_> = blocks.iter().map(|b| b.id()).collect();
    blocks
        .iter()
        .filter(|block| {
            !block
                .descendants()
                .skip(1)
                .any(|node| ids.contains(&node.id()))
        })
        .copied()
        .collect()
}

fn extract_company(
    block: ElementRef<'_>,
    name_cascade: &Cascade,
    source: &CompanySource,
    config: &CompanyConfig,
    scraped_at: &str,
) -> Option<CompanyRecord> {
    let company_name = name_cascade
        .first(block)
        .map(|n| collapse_whitespace(&n))
        .filter(|n| !n.is_empty());
    let Some(company_name) = company_name else {
        debug!("Block has no company name; skipping");
        return None;
    };

    let nodes = text_nodes(block);
    let contact_text = contact_text(block);

    Some(CompanyRecord {
        address: find_address(&nodes, &company_name, &config.address_hint)
            .unwrap_or_else(|| config.default_address.clone()),
        emails: extract_emails(&contact_text),
        phones: extract_phones(&contact_text),
        hrd_name: extract_hrd_name(&nodes),
        industry: INDUSTRY
            .first(block)
            .map(|i| collapse_whitespace(&i))
            .filter(|i| !i.is_empty()),
        company_name,
        source: source.name.clone(),
        scraped_at: scraped_at.to_string(),
    })
}

/// Visible text plus the targets of `mailto:`/`tel:` links.
fn contact_text(block: ElementRef<'_>) -> String {
    let mut text = visible_text(block);
    for link in block.select(&CONTACT_LINKS) {
        if let Some(href) = link.value().attr("href") {
            let target = href
                .trim_start_matches("mailto:")
                .trim_start_matches("tel:")
                .split('?')
                .next()
                .unwrap_or_default();
            text.push(' ');
            text.push_str(target);
        }
    }
    text
}

/// First text node mentioning `hint` that is not the company name and
/// is not an email line.
fn find_address(nodes: &[String], company_name: &str, hint: &str) -> Option<String> {
    if hint.trim().is_empty() {
        return None;
    }
    let hint = hint.to_lowercase();
    nodes
        .iter()
        .map(|n| collapse_whitespace(n))
        .find(|n| n != company_name && !EMAIL.is_match(n) && n.to_lowercase().contains(&hint))
}

/// Distinct contact addresses in `text`, sorted, with blacklisted and
/// asset-like matches removed.
pub fn extract_emails(text: &str) -> Vec<String> {
    EMAIL
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|email| {
            let lowered = email.to_lowercase();
            !EMAIL_BLACKLIST.iter().any(|b| lowered.contains(b))
                && !ASSET_SUFFIXES.iter().any(|s| lowered.ends_with(s))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct phone numbers in `text`, separators stripped, sorted. Numbers
/// shorter than ten characters after stripping are discarded.
pub fn extract_phones(text: &str) -> Vec<String> {
    PHONES
        .iter()
        .flat_map(|pattern| pattern.find_iter(text))
        .map(|m| PHONE_SEPARATORS.replace_all(m.as_str(), "").into_owned())
        .filter(|digits| digits.len() >= MIN_PHONE_DIGITS)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Name following an `HRD:`/`Personalia:`-style label. The name may sit in
/// the same text node as the label or in the next one. Empty when absent.
pub fn extract_hrd_name(nodes: &[String]) -> String {
    for (i, node) in nodes.iter().enumerate() {
        let Some(caps) = HRD_LABEL.captures(node) else {
            continue;
        };
        let Some(name) = caps.name("name") else {
            continue;
        };
        if node[name.end()..].starts_with('@') {
            continue;
        }
        let inline = name.as_str().trim();
        let candidate = if inline.is_empty() {
            nodes.get(i + 1).map(String::as_str).unwrap_or_default()
        } else {
            name.as_str()
        };
        let candidate = collapse_whitespace(candidate.split(" - ").next().unwrap_or_default());
        if is_plausible_name(&candidate) {
            return candidate;
        }
    }
    String::new()
}

fn is_plausible_name(candidate: &str) -> bool {
    let words = candidate.split_whitespace().count();
    (1..=6).contains(&words)
        && candidate.len() <= 60
        && candidate.chars().any(char::is_alphabetic)
        && !candidate.chars().any(|c| c.is_ascii_digit() || c == '@')
}
