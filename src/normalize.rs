//! Locale-aware cleanup of extracted strings.
//!
//! Listing pages are mostly Indonesian, so date parsing understands
//! Indonesian month names and the text filter keeps diacritics intact.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

/// Full and abbreviated Indonesian month names.
const MONTHS: &[(&str, &str)] = &[
    ("januari", "01"),
    ("februari", "02"),
    ("maret", "03"),
    ("april", "04"),
    ("mei", "05"),
    ("juni", "06"),
    ("juli", "07"),
    ("agustus", "08"),
    ("september", "09"),
    ("oktober", "10"),
    ("november", "11"),
    ("desember", "12"),
    ("jan", "01"),
    ("feb", "02"),
    ("mar", "03"),
    ("apr", "04"),
    ("jun", "06"),
    ("jul", "07"),
    ("agu", "08"),
    ("ags", "08"),
    ("agt", "08"),
    ("sep", "09"),
    ("sept", "09"),
    ("okt", "10"),
    ("nov", "11"),
    ("des", "12"),
];

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s\-'āĀēĒīĪōŌūŪḍḌṭṬṇṆñÑḷḶṃṂḥḤ]").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}").unwrap());
static TRAILING_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<date>.*?)[\s,|]+(?P<time>\d{1,2}[:.]\d{2})(?::\d{2})?(?:\s*(?:wib|wita|wit))?$")
        .unwrap()
});
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]+").unwrap());
static LOCATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]{2,}(?:\s*,\s*[A-Z]{2,}|\s+[A-Z]{2,})*)\b").unwrap());

/// Collapse whitespace and drop punctuation, keeping letters (diacritics
/// included), digits, hyphens and apostrophes.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let filtered = DISALLOWED.replace_all(text, " ");
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse runs of whitespace to single spaces and trim, leaving
/// punctuation alone. Used for names and addresses.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert an Indonesian date string to `yyyy-mm-dd`, keeping a trailing
/// `HH:MM` time as a suffix. Unrecognised input is returned unchanged.
///
/// ```ignore
/// assert_eq!(parse_date("17 Februari 2025"), "2025-02-17");
/// assert_eq!(parse_date("17/02/2025 20:29"), "2025-02-17 20:29");
/// assert_eq!(parse_date("garbage"), "garbage");
/// ```
pub fn parse_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if ISO_DATE.is_match(trimmed) {
        return trimmed.to_string();
    }

    let lowered = trimmed.to_lowercase();
    let (date_part, time_suffix) = match TRAILING_TIME.captures(&lowered) {
        Some(caps) => (
            caps["date"].trim().to_string(),
            format!(" {}", caps["time"].replace('.', ":")),
        ),
        None => (lowered.clone(), String::new()),
    };

    if let Some(month) = month_number(&date_part) {
        let numbers: Vec<&str> = DIGITS.find_iter(&date_part).map(|m| m.as_str()).collect();
        if numbers.len() >= 2 {
            let day = format!("{:0>2}", numbers[0]);
            let year = numbers[numbers.len() - 1];
            return format!("{year}-{month}-{day}{time_suffix}");
        }
    }

    if date_part.contains('/') || date_part.contains('-') {
        let parts: Vec<&str> = date_part.split(['/', '-']).map(str::trim).collect();
        if parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())) {
            return if parts[0].len() == 4 {
                format!("{}-{:0>2}-{:0>2}{time_suffix}", parts[0], parts[1], parts[2])
            } else {
                format!("{}-{:0>2}-{:0>2}{time_suffix}", parts[2], parts[1], parts[0])
            };
        }
    }

    debug!(input = %raw, "Unrecognised date format; passing through");
    raw.to_string()
}

fn month_number(date_part: &str) -> Option<&'static str> {
    for word in WORDS.find_iter(date_part) {
        if let Some((_, num)) = MONTHS.iter().find(|(name, _)| *name == word.as_str()) {
            return Some(num);
        }
    }
    // Run-together forms like "17februari2025".
    MONTHS
        .iter()
        .take(12)
        .find(|(name, _)| date_part.contains(name))
        .map(|(_, num)| *num)
}

/// Dateline location at the start of a lede: `"JAKARTA, KOMPAS.com - ..."`
/// yields `"JAKARTA"`. Returns an empty string when the text does not open
/// with upper-case words.
pub fn extract_location(text: &str) -> String {
    LOCATION
        .captures(text.trim_start())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Resolve `href` against the page it was found on.
///
/// Empty input stays empty and absolute `http(s)` links are returned as-is.
/// Links that cannot be resolved become empty, which drops the item.
pub fn normalize_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(resolved) if matches!(resolved.scheme(), "http" | "https") => resolved.to_string(),
        _ => String::new(),
    }
}

/// Case-insensitive substring match against any keyword.
pub fn contains_keywords(text: &str, keywords: &[String]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|k| text.contains(&k.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Harga\n\n  beras\t naik  "), "Harga beras naik");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_clean_text_drops_punctuation_keeps_hyphen_apostrophe() {
        assert_eq!(
            clean_text("JAKARTA - Ini adalah contoh teks berita..."),
            "JAKARTA - Ini adalah contoh teks berita"
        );
        assert_eq!(clean_text("Jum'at, 17/02"), "Jum'at 17 02");
    }

    #[test]
    fn test_clean_text_keeps_diacritics() {
        assert_eq!(clean_text("Sūrya Ḍharma ñ!"), "Sūrya Ḍharma ñ");
        assert_eq!(clean_text("Café résumé"), "Café résumé");
    }

    #[test]
    fn test_collapse_whitespace_keeps_punctuation() {
        assert_eq!(
            collapse_whitespace("  Jl. Kalimalang No. 45,\n   Bekasi Barat "),
            "Jl. Kalimalang No. 45, Bekasi Barat"
        );
    }

    #[test]
    fn test_parse_date_month_name() {
        assert_eq!(parse_date("17 Februari 2025"), "2025-02-17");
        assert_eq!(parse_date("Senin, 3 Maret 2025"), "2025-03-03");
        assert_eq!(parse_date("5 Des 2024"), "2024-12-05");
    }

    #[test]
    fn test_parse_date_numeric() {
        assert_eq!(parse_date("17/02/2025"), "2025-02-17");
        assert_eq!(parse_date("7-2-2025"), "2025-02-07");
        assert_eq!(parse_date("2025/2/7"), "2025-02-07");
    }

    #[test]
    fn test_parse_date_iso_passthrough() {
        assert_eq!(parse_date("2025-02-17"), "2025-02-17");
        assert_eq!(parse_date("2025-02-17T20:29:00+07:00"), "2025-02-17T20:29:00+07:00");
    }

    #[test]
    fn test_parse_date_keeps_time() {
        assert_eq!(parse_date("17 Feb 2025 20:29"), "2025-02-17 20:29");
        assert_eq!(parse_date("Senin, 17 Februari 2025 | 20:29 WIB"), "2025-02-17 20:29");
        assert_eq!(parse_date("17/02/2025 08:05"), "2025-02-17 08:05");
    }

    #[test]
    fn test_parse_date_fallback() {
        assert_eq!(parse_date("garbage"), "garbage");
        assert_eq!(parse_date("Kemarin"), "Kemarin");
        assert_eq!(parse_date(""), "");
    }

    #[test]
    fn test_extract_location() {
        assert_eq!(extract_location("JAKARTA, KOMPAS.com - Berita terkini"), "JAKARTA");
        assert_eq!(extract_location("BANDUNG - Hujan deras"), "BANDUNG");
        assert_eq!(extract_location("Ini adalah berita"), "");
        assert_eq!(extract_location(""), "");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("http://a.com/p", ""), "");
        assert_eq!(normalize_url("http://a.com/p", "http://x"), "http://x");
        assert_eq!(normalize_url("http://a.com/p", "/q"), "http://a.com/q");
        assert_eq!(
            normalize_url("https://www.kompas.com/news/", "berita/1"),
            "https://www.kompas.com/news/berita/1"
        );
        assert_eq!(normalize_url("https://a.com/", "javascript:void(0)"), "");
    }

    #[test]
    fn test_contains_keywords() {
        let keywords = vec!["Ekonomi".to_string(), "politik".to_string()];
        assert!(contains_keywords("Pertumbuhan EKONOMI melambat", &keywords));
        assert!(!contains_keywords("Resep rendang", &keywords));
        assert!(!contains_keywords("anything", &[]));
    }
}
