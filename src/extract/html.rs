// src/extract/html.rs
//! Structural extraction from an HTML page.
//!
//! `scraper::Html` is not `Send`, so everything here is synchronous and the
//! document never outlives [`extract_page`]. Async callers fetch first, then
//! call in.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::text::{self, EMAIL, PHONE};
use crate::records::{ContactBook, DonationPolicy, Profile};
use crate::validate::{is_contact_phone, is_plausible_name};

static BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("tr, li, div, section").unwrap());
static HEADINGS: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, h4, b, strong").unwrap());
static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Capitalized run, or an all-caps run (`JANE DOE`) which the name check then weighs.
static NAME_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][a-z]+(?: [A-Z][a-z]+)*|[A-Z]{2,}(?: [A-Z]{2,})*").unwrap());

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "b", "strong"];
const SKIP_TEXT_IN: &[&str] = &["script", "style", "noscript", "template"];

/// Blocks outside this length range are navigation crumbs or whole page sections.
const MIN_BLOCK_CHARS: usize = 15;
const MAX_BLOCK_CHARS: usize = 400;

/// Result of parsing one page.
#[derive(Debug, Default)]
pub struct PageExtract {
    pub book: ContactBook,
    /// Absolute, fragment-free links to non-PDF resources, in document order.
    pub links: Vec<Url>,
    /// Absolute links ending in `.pdf`.
    pub pdf_links: Vec<Url>,
}

fn elem_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        if let Some(t) = node.value().as_text() {
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| SKIP_TEXT_IN.contains(&a.value().name()));
            if !hidden {
                out.push_str(t);
                out.push(' ');
            }
        }
    }
    text::collapse_ws(&out)
}

fn first_name_run(s: &str) -> String {
    NAME_RUN.find(s).map(|m| m.as_str().trim().to_string()).unwrap_or_default()
}

/// Name from the nearest preceding heading-like sibling of `block`.
fn heading_before(block: ElementRef<'_>) -> String {
    for node in block.prev_siblings() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if HEADING_TAGS.contains(&el.value().name()) {
            return first_name_run(&elem_text(el));
        }
        if let Some(h) = el.select(&HEADINGS).last() {
            return first_name_run(&elem_text(h));
        }
    }
    String::new()
}

/// Last (up to three) words before `needle` in `block_text`.
fn words_before(block_text: &str, needle: &str) -> String {
    let before = block_text.split(needle).next().unwrap_or_default();
    let words: Vec<&str> = before.split_whitespace().collect();
    let from = words.len().saturating_sub(3);
    words[from..].join(" ")
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("javascript:") {
        return None;
    }
    let mut u = base.join(href).ok()?;
    if !matches!(u.scheme(), "http" | "https") {
        return None;
    }
    u.set_fragment(None);
    Some(u)
}

fn is_pdf(u: &Url) -> bool {
    u.path().to_ascii_lowercase().ends_with(".pdf")
}

/// Parse a fetched page into a contact batch plus its outgoing links.
pub fn extract_page(html: &str, page_url: &Url, policy: DonationPolicy) -> PageExtract {
    let document = Html::parse_document(html);
    let source = page_url.as_str();

    let visible = match document.select(&BODY).next() {
        Some(body) => elem_text(body),
        None => elem_text(document.root_element()),
    };
    let mut book = text::extract_contact_info(&visible, Some(source), "html", None, policy);
    // page-wide sweep contributes flat lists only; profiles come from blocks below
    book.profiles.clear();

    let mut seen: Vec<(String, String, String)> = Vec::new();
    for block in document.select(&BLOCKS) {
        let block_text = elem_text(block);
        let len = block_text.chars().count();
        if !(MIN_BLOCK_CHARS..=MAX_BLOCK_CHARS).contains(&len) {
            continue;
        }

        let email = EMAIL.find(&block_text).map(|m| m.as_str().to_string());
        let phone = PHONE
            .find_iter(&block_text)
            .map(|m| m.as_str().trim().to_string())
            .find(|p| is_contact_phone(p));
        if email.is_none() && phone.is_none() {
            continue;
        }

        let mut name = first_name_run(&block_text);
        if name.is_empty() {
            name = heading_before(block);
        }
        if !is_plausible_name(&name) {
            let anchor = email.as_deref().or(phone.as_deref()).unwrap_or_default();
            name = words_before(&block_text, anchor);
        }
        if !is_plausible_name(&name) {
            continue;
        }

        let key = (
            name.to_lowercase(),
            email.clone().unwrap_or_default(),
            phone.clone().unwrap_or_default(),
        );
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        let mut profile = Profile::new(Some(name.clone()), Some(source.to_string()));
        profile.context = Some(block_text.clone());
        if let Some(e) = email {
            profile.add_email(e.as_str(), Some("html"));
            book.add_email(e);
        }
        if let Some(p) = phone {
            profile.add_phone(p.as_str(), Some("html"));
            book.add_phone(p);
        }
        for d in text::find_donations(&block_text, Some(source)) {
            crate::records::add_donation(&mut profile.donations, d, policy);
        }
        book.add_name(name);
        book.add_profile(profile, policy);
    }

    let mut links = Vec::new();
    let mut pdf_links = Vec::new();
    for a in document.select(&ANCHORS) {
        let Some(u) = a.value().attr("href").and_then(|h| resolve(page_url, h)) else {
            continue;
        };
        if is_pdf(&u) {
            if book.add_pdf_link(u.as_str()) {
                pdf_links.push(u);
            }
        } else if !links.contains(&u) {
            links.push(u);
        }
    }

    debug!(
        url = %page_url,
        profiles = book.profiles.len(),
        emails = book.emails.len(),
        links = links.len(),
        pdfs = pdf_links.len(),
        "page parsed"
    );
    PageExtract { book, links, pdf_links }
}
