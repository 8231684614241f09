//! Selector helpers over `scraper` fragments.
//!
//! Listing rows and more-info panels are fetched from the browser as outer
//! HTML and parsed here. Field extraction is a list of strategies tried in
//! order; the first non-empty result wins.

use crate::normalize::{clean, parse_data_slug, parse_id_slug_from_href};
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

/// Parse a selector, logging and returning `None` when it is invalid.
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!("Invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

/// First element of an outer-HTML fragment, i.e. the row or panel itself.
pub fn fragment_root(doc: &Html) -> Option<ElementRef<'_>> {
    doc.root_element().children().filter_map(ElementRef::wrap).next()
}

pub fn element_text(el: ElementRef<'_>) -> String {
    clean(&el.text().collect::<String>())
}

pub fn find<'a>(root: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    let found = root.select(&sel).next();
    found
}

pub fn find_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => root.select(&sel).collect(),
        None => Vec::new(),
    }
}

pub fn exists(root: ElementRef<'_>, css: &str) -> bool {
    find(root, css).is_some()
}

/// Cleaned text of the first match, or empty.
pub fn text_of(root: ElementRef<'_>, css: &str) -> String {
    find(root, css).map(element_text).unwrap_or_default()
}

/// Trimmed attribute of the first match, or empty.
pub fn attr_of(root: ElementRef<'_>, css: &str, attr: &str) -> String {
    find(root, css)
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Text of the first selector whose match has non-empty text.
pub fn first_text(root: ElementRef<'_>, candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|css| text_of(root, css))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// Run strategies in order; the first non-empty value wins.
pub fn first_non_empty(strategies: &[&dyn Fn() -> String]) -> String {
    strategies
        .iter()
        .map(|strategy| strategy())
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

pub fn class_list(el: ElementRef<'_>) -> String {
    el.value().attr("class").unwrap_or_default().to_lowercase()
}

/// Value of a statblock item whose label contains `label` (case-insensitive).
pub fn statblock_value(root: ElementRef<'_>, label: &str) -> String {
    let wanted = label.to_lowercase();
    find_all(root, ".ddb-statblock-item")
        .into_iter()
        .find(|item| {
            let label_text = text_of(*item, ".ddb-statblock-item-label");
            let haystack = if label_text.is_empty() {
                element_text(*item)
            } else {
                label_text
            };
            haystack.to_lowercase().contains(&wanted)
        })
        .map(|item| text_of(item, ".ddb-statblock-item-value"))
        .unwrap_or_default()
}

/// `(id, slug)` of a listing row: `data-slug` first, then the first link.
pub fn row_identity(row: ElementRef<'_>, kind: &str) -> Option<(String, String)> {
    if let Some(found) = row.value().attr("data-slug").and_then(parse_data_slug) {
        return Some(found);
    }
    let link = find(row, "a.link").or_else(|| find(row, "a"))?;
    parse_id_slug_from_href(link.value().attr("href")?, kind)
}

/// Largest page number among pagination links, by text or `page=` query.
pub fn max_page_number(links: &[(String, String)]) -> Option<usize> {
    links
        .iter()
        .filter_map(|(text, href)| {
            text.trim().parse::<usize>().ok().or_else(|| {
                href.split(&['?', '&'][..])
                    .find_map(|part| part.strip_prefix("page="))
                    .and_then(|n| n.parse::<usize>().ok())
            })
        })
        .max()
}
