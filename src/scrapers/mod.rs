//! Selector-cascade extraction from listing pages.
//!
//! Pages come from many outlets with no shared markup, so every field is
//! located by a [`Cascade`]: an ordered list of independent [`Lookup`]s, each
//! a pure `block -> Option<String>` function. The first lookup that yields a
//! non-empty value wins; when none does, the caller applies a default.
//!
//! # Submodules
//!
//! | Module | Produces | Candidate blocks |
//! |--------|----------|------------------|
//! | [`news`] | [`Article`](crate::models::Article) | `article, div, h3` with class hints `article, news, post, berita, content` |
//! | [`company`] | [`CompanyRecord`](crate::models::CompanyRecord) | `div, article` with directory or job-board class hints |

pub mod company;
pub mod news;

use crate::normalize::clean_text;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

/// Subtrees that never contribute text.
const NON_CONTENT: &[&str] = &["script", "style", "iframe", "form", "noscript"];

/// Elements whose boundaries separate words.
const BLOCK_LEVEL: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "article", "section",
    "header", "footer", "tr", "td", "th", "blockquote", "time",
];

/// One extraction strategy for a field.
pub type Lookup = Box<dyn Fn(ElementRef<'_>) -> Option<String> + Send + Sync>;

/// Ordered extraction strategies for one field.
pub struct Cascade {
    lookups: Vec<Lookup>,
}

impl Cascade {
    pub fn new(lookups: Vec<Lookup>) -> Self {
        Self { lookups }
    }

    /// Trimmed value of the first lookup that finds something non-empty.
    pub fn first(&self, block: ElementRef<'_>) -> Option<String> {
        self.lookups.iter().find_map(|lookup| {
            lookup(block)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!(selector = css, error = ?e, "Ignoring invalid selector");
            None
        }
    }
}

/// Compile a list of selectors, dropping any that fail to parse.
pub fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors.iter().filter_map(|css| parse_selector(css)).collect()
}

/// Visible text of the first descendant matching `css` that has any.
pub fn text_of(css: &str) -> Lookup {
    let selector = parse_selector(css);
    Box::new(move |block: ElementRef<'_>| {
        let selector = selector.as_ref()?;
        block
            .select(selector)
            .map(visible_text)
            .find(|t| !t.trim().is_empty())
    })
}

/// First descendant matching `css`: the first present attribute among
/// `attrs`, falling back to its text.
pub fn attr_or_text(css: &str, attrs: &'static [&'static str]) -> Lookup {
    let selector = parse_selector(css);
    Box::new(move |block: ElementRef<'_>| {
        let selector = selector.as_ref()?;
        let element = block.select(selector).next()?;
        attrs
            .iter()
            .filter_map(|a| element.value().attr(a))
            .find(|v| !v.trim().is_empty())
            .map(str::to_string)
            .or_else(|| Some(visible_text(element)))
    })
}

/// Attribute `attr` of the first descendant matching `css` that carries it.
pub fn attr_of(css: &str, attr: &'static str) -> Lookup {
    let selector = parse_selector(css);
    Box::new(move |block: ElementRef<'_>| {
        let selector = selector.as_ref()?;
        block
            .select(selector)
            .filter_map(|el| el.value().attr(attr))
            .find(|v| !v.trim().is_empty())
            .map(str::to_string)
    })
}

/// Attribute `attr` of the block element itself.
pub fn own_attr(attr: &'static str) -> Lookup {
    Box::new(move |block: ElementRef<'_>| block.value().attr(attr).map(str::to_string))
}

/// Text of the first descendant among `tags` whose class mentions a hint.
pub fn class_hint(tags: &str, hints: &'static [&'static str]) -> Lookup {
    let selector = parse_selector(tags);
    Box::new(move |block: ElementRef<'_>| {
        let selector = selector.as_ref()?;
        block
            .select(selector)
            .find(|el| class_matches(*el, hints))
            .map(visible_text)
    })
}

/// Whether the element's class attribute contains any of `hints`
/// (case-insensitive substring).
pub fn class_matches(element: ElementRef<'_>, hints: &[&str]) -> bool {
    element
        .value()
        .attr("class")
        .map(|class| {
            let class = class.to_lowercase();
            hints.iter().any(|hint| class.contains(hint))
        })
        .unwrap_or(false)
}

/// Candidate blocks in document order: elements matching `tags` whose class
/// carries one of `hints`.
pub fn find_blocks<'a>(document: &'a Html, tags: &Selector, hints: &[&str]) -> Vec<ElementRef<'a>> {
    document
        .select(tags)
        .filter(|el| class_matches(*el, hints))
        .collect()
}

/// Text content with non-content subtrees removed and word breaks kept at
/// block boundaries.
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_text(element, &mut out);
    out
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if NON_CONTENT.contains(&name) {
                continue;
            }
            let block = BLOCK_LEVEL.contains(&name);
            if block {
                out.push(' ');
            }
            push_text(child, out);
            if block {
                out.push(' ');
            }
        }
    }
}

/// Non-empty trimmed text nodes under `element` in document order,
/// skipping non-content subtrees.
pub fn text_nodes(element: ElementRef<'_>) -> Vec<String> {
    let mut out = Vec::new();
    collect_text_nodes(element, &mut out);
    out
}

fn collect_text_nodes(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        } else if let Some(child) = ElementRef::wrap(child) {
            if !NON_CONTENT.contains(&child.value().name()) {
                collect_text_nodes(child, out);
            }
        }
    }
}

/// Cleaned paragraph texts under `element`, skipping non-content subtrees.
/// Falls back to the whole visible text when there are no `<p>` elements.
pub fn paragraphs(element: ElementRef<'_>) -> Vec<String> {
    let mut out = Vec::new();
    collect_paragraphs(element, &mut out);
    if out.is_empty() {
        let text = clean_text(&visible_text(element));
        if !text.is_empty() {
            out.push(text);
        }
    }
    out
}

fn collect_paragraphs(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children().filter_map(ElementRef::wrap) {
        let name = child.value().name();
        if NON_CONTENT.contains(&name) {
            continue;
        }
        if name == "p" {
            let text = clean_text(&visible_text(child));
            if !text.is_empty() {
                out.push(text);
            }
        } else {
            collect_paragraphs(child, out);
        }
    }
}
