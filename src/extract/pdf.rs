// src/extract/pdf.rs
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::text;
use crate::error::{HarvestError, Result};
use crate::records::{ContactBook, DonationPolicy};

/// Full document text. Malformed documents are a `Parse` error, never a panic.
pub fn pdf_text(bytes: &[u8]) -> Result<String> {
    // pdf-extract panics on some malformed xref tables
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));
    match res {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(HarvestError::parse("pdf", e)),
        Err(_) => Err(HarvestError::parse("pdf", "extractor panicked on malformed document")),
    }
}

/// Contact batch for one PDF. The unnamed profile it produces is tagged with the
/// document URL in `metadata.pdf_sources`.
pub fn extract_pdf(bytes: &[u8], url: &str, policy: DonationPolicy) -> Result<ContactBook> {
    let raw = pdf_text(bytes)?;
    let body = text::collapse_ws(&raw);
    let mut book = text::extract_contact_info(&body, Some(url), "pdf", None, policy);
    for p in &mut book.profiles {
        crate::records::add_unique(&mut p.metadata.pdf_sources, url);
    }
    book.add_pdf_link(url);
    metrics::counter!("harvest_pdfs_total").increment(1);
    debug!(url, chars = body.len(), emails = book.emails.len(), "pdf extracted");
    Ok(book)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn file_name_for(url: &str, hash: &str) -> String {
    let last = url::Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(str::to_string)))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{}.pdf", &hash[..12]));
    last.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Store a PDF under `dir` unless a byte-identical file is already there.
/// Returns the written path, or `None` for a duplicate or a document with no key data.
pub fn store_pdf(bytes: &[u8], url: &str, dir: &Path) -> Result<Option<PathBuf>> {
    match pdf_text(bytes) {
        Ok(t) if !text::contains_key_data(&t) => {
            info!(url, "pdf has no key data; not stored");
            return Ok(None);
        }
        Ok(_) => {}
        Err(e) => {
            warn!(url, error = %e, "pdf unreadable; not stored");
            return Ok(None);
        }
    }

    std::fs::create_dir_all(dir)?;
    let hash = sha256_hex(bytes);
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let existing = std::fs::read(&path)?;
        if sha256_hex(&existing) == hash {
            info!(url, existing = %path.display(), "duplicate pdf skipped");
            return Ok(None);
        }
    }

    let mut path = dir.join(file_name_for(url, &hash));
    if path.exists() {
        // same name, different bytes
        path = dir.join(format!("{}_{}", &hash[..8], file_name_for(url, &hash)));
    }
    std::fs::write(&path, bytes)?;
    info!(url, path = %path.display(), "pdf stored");
    Ok(Some(path))
}
