// src/extract/text.rs
//! Regex extraction over plain text. Used directly for PDFs and mail bodies,
//! and for the page-wide sweep over an HTML document's visible text.

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::records::{ContactBook, Donation, DonationPolicy, Profile};
use crate::validate::{is_contact_phone, is_plausible_name};

pub(crate) static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());

pub(crate) static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?\d{1,2}[\s.-]?)?(?:\(?\d{3}\)?[\s.-]?)?\d{3}[\s.-]?\d{4}").unwrap()
});

/// Bare `(AAA) NNN-NNNN` shape; export normalizes phones to this match.
pub(crate) static PHONE_CORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap());

static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{1,5}\s\w+(?:\s\w+)*,\s\w+(?:\s\w+)*,\s[A-Z]{2}\s\d{5}").unwrap()
});

static DONATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+(?:,\d{3})*(?:\.\d{2})?").unwrap());

static FULL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s[A-Z][a-z]+)+\b").unwrap());

/// `jane [at] example [dot] org` and friends. Each captures (user, domain, tld).
static OBFUSCATED_EMAILS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)([\w.-]+)\s*\[at\]\s*([\w.-]+)\s*\[dot\]\s*([\w.]+)",
        r"(?i)([\w.-]+)\s*\(at\)\s*([\w.-]+)\s*\(dot\)\s*([\w.]+)",
        r"(?i)([\w.-]+)\s*\{at\}\s*([\w.-]+)\s*\{dot\}\s*([\w.]+)",
        r"(?i)([\w.-]+)\s*\[@\]\s*([\w.-]+)\s*\[\.\]\s*([\w.]+)",
        r"(?i)([\w.-]+)\s*[\[(]at[\])]\s*([\w-]+)\s*\.\s*([\w.]+)",
        r"(?i)([\w.-]+)\s+at\s+([\w.-]+)\s+dot\s+([\w.]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Characters of surrounding text kept as a donation's context, on each side.
const DONATION_CONTEXT_CHARS: usize = 60;

/// Decode entities, drop tags, unify quotes and collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    collapse_ws(&out)
}

pub fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Plain and obfuscated emails, first-appearance order, no repeats.
pub fn find_emails(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in EMAIL.find_iter(text) {
        push_new(&mut out, m.as_str().to_string());
    }
    for re in OBFUSCATED_EMAILS.iter() {
        for caps in re.captures_iter(text) {
            let email = format!("{}@{}.{}", &caps[1], &caps[2], &caps[3]).replace(' ', "");
            push_new(&mut out, email);
        }
    }
    out
}

/// Rewrite an obfuscated address to its plain form. Plain input comes back unchanged.
pub fn deobfuscate_email(candidate: &str) -> Option<String> {
    if EMAIL.is_match(candidate) {
        return Some(candidate.trim().to_string());
    }
    OBFUSCATED_EMAILS.iter().find_map(|re| {
        re.captures(candidate)
            .map(|caps| format!("{}@{}.{}", &caps[1], &caps[2], &caps[3]).replace(' ', ""))
    })
}

/// Phone-shaped runs with at least ten digits; prices and years are skipped.
pub fn find_phones(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in PHONE.find_iter(text) {
        let start = m.start();
        let preceded_by_dollar = text[..start].ends_with('$');
        let candidate = m.as_str().trim();
        if !preceded_by_dollar && is_contact_phone(candidate) {
            push_new(&mut out, candidate.to_string());
        }
    }
    out
}

pub fn find_addresses(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in ADDRESS.find_iter(text) {
        push_new(&mut out, m.as_str().to_string());
    }
    out
}

/// Two-or-more capitalized words that pass the name heuristic.
pub fn find_names(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in FULL_NAME.find_iter(text) {
        if is_plausible_name(m.as_str()) {
            push_new(&mut out, m.as_str().to_string());
        }
    }
    out
}

/// Dollar amounts with the surrounding words as context.
pub fn find_donations(text: &str, source: Option<&str>) -> Vec<Donation> {
    DONATION
        .find_iter(text)
        .map(|m| {
            let lo = floor_boundary(text, m.start().saturating_sub(DONATION_CONTEXT_CHARS));
            let hi = ceil_boundary(text, (m.end() + DONATION_CONTEXT_CHARS).min(text.len()));
            let context = collapse_ws(&text[lo..hi]);
            Donation::new(m.as_str(), source.map(str::to_string), Some(context))
        })
        .collect()
}

/// Cheap gate used before storing PDFs: does the text contain anything worth keeping?
pub fn contains_key_data(text: &str) -> bool {
    DONATION.is_match(text)
        || EMAIL.is_match(text)
        || PHONE_CORE.is_match(text)
        || ADDRESS.is_match(text)
        || FULL_NAME.is_match(text)
}

/// Sweep free text for every field kind. When anything contact-like turns up
/// an unnamed profile (or a named one, if `name` is given) is recorded for it.
pub fn extract_contact_info(
    text: &str,
    source: Option<&str>,
    field_source: &str,
    name: Option<&str>,
    policy: DonationPolicy,
) -> ContactBook {
    let mut book = ContactBook::new();
    let emails = find_emails(text);
    let phones = find_phones(text);
    let addresses = find_addresses(text);
    let names = find_names(text);
    let donations = find_donations(text, source);

    for e in &emails {
        book.add_email(e.as_str());
    }
    for p in &phones {
        book.add_phone(p.as_str());
    }
    for a in &addresses {
        book.add_address(a.as_str());
    }
    for n in &names {
        book.add_name(n.as_str());
    }
    for d in &donations {
        book.add_donation(d.clone(), policy);
    }

    if !(emails.is_empty() && phones.is_empty() && addresses.is_empty()) {
        let mut profile = Profile::new(name.map(str::to_string), source.map(str::to_string));
        for e in emails {
            profile.add_email(e, Some(field_source));
        }
        for p in phones {
            profile.add_phone(p, Some(field_source));
        }
        for a in addresses {
            profile.add_address(a, Some(field_source));
        }
        book.add_profile(profile, policy);
    }
    book
}

fn push_new(out: &mut Vec<String>, item: String) {
    if !out.contains(&item) {
        out.push(item);
    }
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
