// src/export.rs
//! CSV and JSON output.
//!
//! CSV rows are the flat view: one row per profile field value plus one per
//! standalone value. JSON is the whole book, reconciled with whatever is
//! already on disk (read, absorb, rewrite; no locking).

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extract::text::{self, PHONE_CORE};
use crate::records::{ContactBook, Donation, DonationPolicy, Profile};
use crate::validate::{looks_like_email, looks_like_phone, note_rejection, FieldKind, Strictness};

pub const JSON_FILE: &str = "extracted_data.json";

pub const CSV_HEADER: [&str; 11] = [
    "Name",
    "First Name",
    "Last Name",
    "Source URL",
    "Type",
    "Date",
    "Email",
    "Phone",
    "Address",
    "Donation Amount",
    "Donation Context",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    #[default]
    Profile,
    Email,
    Phone,
    Address,
    Donation,
}

/// One CSV line. Field order matches [`CSV_HEADER`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Row {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "First Name")]
    pub first_name: String,
    #[serde(rename = "Last Name")]
    pub last_name: String,
    #[serde(rename = "Source URL")]
    pub source_url: String,
    #[serde(rename = "Type")]
    pub kind: RowKind,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Donation Amount")]
    pub donation_amount: String,
    #[serde(rename = "Donation Context")]
    pub donation_context: String,
}

#[derive(Debug, Clone)]
pub struct ExportContext {
    /// Page or source the standalone values came from.
    pub source_url: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`; the date for every non-donation row.
    pub exported_at: String,
}

impl ExportContext {
    pub fn now(source_url: Option<&str>) -> Self {
        Self {
            source_url: source_url.map(str::to_string),
            exported_at: crate::records::now_stamp(),
        }
    }
}

/// Plain form of an email candidate that passes the strict check.
fn clean_email(candidate: &str) -> Option<String> {
    let plain = text::deobfuscate_email(candidate).unwrap_or_else(|| candidate.trim().to_string());
    if looks_like_email(&plain, Strictness::Strict) {
        Some(plain)
    } else {
        note_rejection(FieldKind::Email, candidate);
        None
    }
}

fn clean_phone(candidate: &str) -> Option<String> {
    match PHONE_CORE.find(candidate).map(|m| m.as_str().to_string()) {
        Some(p) if looks_like_phone(&p, Strictness::Strict) => Some(p),
        _ => {
            note_rejection(FieldKind::Phone, candidate);
            None
        }
    }
}

fn clean_address(candidate: &str) -> Option<String> {
    let a = text::collapse_ws(candidate);
    (!a.is_empty()).then_some(a)
}

fn profile_emails(p: &Profile) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let scanned = p
        .context
        .as_deref()
        .map(text::find_emails)
        .unwrap_or_default();
    for e in p.emails.iter().cloned().chain(scanned) {
        if let Some(clean) = clean_email(&e) {
            if !out.contains(&clean) {
                out.push(clean);
            }
        }
    }
    out
}

fn donation_row(base: &Row, d: &Donation) -> Row {
    Row {
        kind: RowKind::Donation,
        date: d.date.clone(),
        donation_amount: d.amount.clone(),
        donation_context: d.context.clone().unwrap_or_default(),
        ..base.clone()
    }
}

fn profile_rows(p: &Profile, ctx: &ExportContext) -> Vec<Row> {
    let base = Row {
        name: p.name.clone().unwrap_or_default(),
        first_name: p.first_name.clone().unwrap_or_default(),
        last_name: p.last_name.clone().unwrap_or_default(),
        source_url: p.source_url.clone().unwrap_or_default(),
        kind: RowKind::Profile,
        date: ctx.exported_at.clone(),
        donation_context: p.context.clone().unwrap_or_default(),
        ..Row::default()
    };

    let mut rows = Vec::new();
    for e in profile_emails(p) {
        rows.push(Row { kind: RowKind::Email, email: e, ..base.clone() });
    }
    for ph in p.phones.iter().filter_map(|ph| clean_phone(ph)) {
        rows.push(Row { kind: RowKind::Phone, phone: ph, ..base.clone() });
    }
    for a in p.addresses.iter().filter_map(|a| clean_address(a)) {
        rows.push(Row { kind: RowKind::Address, address: a, ..base.clone() });
    }
    for d in &p.donations {
        rows.push(donation_row(&base, d));
    }
    if rows.is_empty() {
        rows.push(base);
    }
    rows
}

/// Flatten a book into CSV rows.
pub fn to_rows(book: &ContactBook, ctx: &ExportContext) -> Vec<Row> {
    let mut rows: Vec<Row> = book.profiles.iter().flat_map(|p| profile_rows(p, ctx)).collect();

    let standalone = Row {
        source_url: ctx.source_url.clone().unwrap_or_default(),
        date: ctx.exported_at.clone(),
        ..Row::default()
    };
    let mut seen_emails: Vec<String> = Vec::new();
    for e in &book.emails {
        for found in text::find_emails(e).into_iter().chain(std::iter::once(e.clone())) {
            let Some(clean) = clean_email(&found) else { continue };
            if seen_emails.contains(&clean) {
                continue;
            }
            seen_emails.push(clean.clone());
            rows.push(Row { kind: RowKind::Email, email: clean, ..standalone.clone() });
        }
    }
    for ph in book.phone_numbers.iter().filter_map(|p| clean_phone(p)) {
        rows.push(Row { kind: RowKind::Phone, phone: ph, ..standalone.clone() });
    }
    for a in book.addresses.iter().filter_map(|a| clean_address(a)) {
        rows.push(Row { kind: RowKind::Address, address: a, ..standalone.clone() });
    }
    for d in &book.donations {
        rows.push(donation_row(&standalone, d));
    }
    rows
}

/// Write rows under the fixed header. The header is written even for zero rows.
pub fn write_csv(rows: &[Row], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(CSV_HEADER)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = rows.len(), "csv written");
    Ok(())
}

/// Host (and port) of `url` with dots and colons as underscores.
pub fn sanitize_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            let host = u.host_str()?.to_string();
            Some(match u.port() {
                Some(p) => format!("{host}_{p}"),
                None => host,
            })
        })
        .filter(|h| !h.is_empty())
        .map(|h| h.replace(['.', ':'], "_"))
        .unwrap_or_else(|| "unknown_domain".to_string())
}

pub fn domain_dir(base: &Path, url: &str) -> PathBuf {
    base.join(sanitize_domain(url))
}

/// `<base>/<domain>/<domain>_donor_data_<YYYYmmdd_HHMMSS>.csv`
pub fn csv_path(base: &Path, url: &str, now: NaiveDateTime) -> PathBuf {
    labeled_csv_path(base, &sanitize_domain(url), now)
}

/// Same layout as [`csv_path`] for sources that are not web pages (`mail`, `google`, ...).
pub fn labeled_csv_path(base: &Path, label: &str, now: NaiveDateTime) -> PathBuf {
    base.join(label)
        .join(format!("{label}_donor_data_{}.csv", now.format("%Y%m%d_%H%M%S")))
}

/// Flatten `book` for `url` and write it to a fresh timestamped file under `base`.
pub fn export_csv(book: &ContactBook, url: &str, base: &Path) -> Result<PathBuf> {
    let path = csv_path(base, url, chrono::Local::now().naive_local());
    let rows = to_rows(book, &ExportContext::now(Some(url)));
    write_csv(&rows, &path)?;
    Ok(path)
}

/// On-disk shape of `extracted_data.json`. `Donors` is not persisted.
#[derive(Serialize)]
struct SavedBook<'a> {
    #[serde(rename = "Profiles")]
    profiles: &'a [Profile],
    #[serde(rename = "Emails")]
    emails: &'a [String],
    #[serde(rename = "PhoneNumbers")]
    phone_numbers: &'a [String],
    #[serde(rename = "Donations")]
    donations: &'a [Donation],
    #[serde(rename = "Names")]
    names: &'a [String],
    #[serde(rename = "Addresses")]
    addresses: &'a [String],
    #[serde(rename = "PDFLinks")]
    pdf_links: &'a [String],
    #[serde(rename = "Entities")]
    entities: &'a [serde_json::Value],
}

impl<'a> From<&'a ContactBook> for SavedBook<'a> {
    fn from(b: &'a ContactBook) -> Self {
        Self {
            profiles: &b.profiles,
            emails: &b.emails,
            phone_numbers: &b.phone_numbers,
            donations: &b.donations,
            names: &b.names,
            addresses: &b.addresses,
            pdf_links: &b.pdf_links,
            entities: &b.entities,
        }
    }
}

pub fn load_json(path: &Path) -> Result<ContactBook> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    ContactBook::from_value(value)
}

/// Move an unreadable saved file out of the way so the next write does not clobber it.
fn quarantine(path: &Path) -> Result<PathBuf> {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let aside = path.with_file_name(format!("{JSON_FILE}.corrupt-{ts}"));
    std::fs::rename(path, &aside)?;
    Ok(aside)
}

/// Reconcile `book` with `<dir>/extracted_data.json` (if any) and rewrite it.
/// Returns the path and the book as written.
pub fn save_json(book: &ContactBook, dir: &Path, policy: DonationPolicy) -> Result<(PathBuf, ContactBook)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(JSON_FILE);
    let merged = if path.exists() {
        match load_json(&path) {
            Ok(mut saved) => {
                let summary = saved.absorb(book.clone(), policy);
                debug!(inserted = summary.inserted, merged = summary.merged, "reconciled with saved data");
                saved
            }
            Err(e) => {
                let aside = quarantine(&path)?;
                warn!(error = %e, moved_to = %aside.display(), "error loading existing data; starting a fresh file");
                book.clone()
            }
        }
    } else {
        book.clone()
    };
    let body = serde_json::to_string_pretty(&SavedBook::from(&merged))?;
    std::fs::write(&path, body)?;
    info!(path = %path.display(), profiles = merged.profiles.len(), "json written");
    Ok((path, merged))
}
