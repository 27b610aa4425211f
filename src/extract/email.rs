// src/extract/email.rs
//! Saved mail files: `.eml` (one message) and `.mbox` (many, split on `From ` lines).
//! Only headers and text bodies are read; attachments are ignored.

use std::path::Path;

use tracing::{debug, info, warn};

use super::text;
use crate::error::Result;
use crate::records::{ContactBook, DonationPolicy};
use crate::validate::is_plausible_name;

const MAIL_EXTENSIONS: &[&str] = &["eml", "mbox"];

#[derive(Debug, Default, PartialEq)]
pub struct MailMessage {
    pub from: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

impl MailMessage {
    /// Display name from `From: Jane Doe <jane@x.org>`, quotes stripped.
    pub fn sender_name(&self) -> Option<String> {
        let from = self.from.as_deref()?;
        let (name, _) = from.split_once('<')?;
        let name = name.trim().trim_matches('"').trim();
        is_plausible_name(name).then(|| name.to_string())
    }
}

/// Split a raw RFC 822 message into headers and body. Folded header lines are joined.
pub fn parse_message(raw: &str) -> MailMessage {
    let raw = raw.replace("\r\n", "\n");
    let (head, body) = raw.split_once("\n\n").unwrap_or((raw.as_str(), ""));

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, v)) = headers.last_mut() {
                v.push(' ');
                v.push_str(line.trim());
            }
            continue;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_ascii_lowercase(), v.trim().to_string()));
        }
    }
    let header = |name: &str| headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());

    let is_html = header("content-type").is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
        || body.contains("<html");
    let body = if is_html { text::normalize_text(body) } else { body.to_string() };

    MailMessage {
        from: header("from"),
        subject: header("subject"),
        body,
    }
}

/// Messages of an mbox file. Lines starting `From ` open a new message.
pub fn split_mbox(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for line in raw.lines() {
        if line.starts_with("From ") {
            if !current.trim().is_empty() {
                out.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn absorb_message(book: &mut ContactBook, msg: &MailMessage, source: &str, policy: DonationPolicy) {
    let mut blob = String::new();
    if let Some(f) = &msg.from {
        blob.push_str(f);
        blob.push('\n');
    }
    blob.push_str(&msg.body);
    let name = msg.sender_name();
    let batch = text::extract_contact_info(&blob, Some(source), "email", name.as_deref(), policy);
    book.merge(batch, policy);
}

/// Walk `dir` recursively and fold every mail file into one batch. Unreadable
/// files are logged and skipped.
pub fn parse_mail_dir(dir: &Path, policy: DonationPolicy) -> Result<ContactBook> {
    let mut book = ContactBook::new();
    let mut stack = vec![dir.to_path_buf()];
    let mut files = 0usize;

    while let Some(d) = stack.pop() {
        for entry in std::fs::read_dir(&d)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if !MAIL_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            let raw = match std::fs::read(&path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "mail file unreadable; skipped");
                    continue;
                }
            };
            let source = format!("email:{}", path.display());
            let messages = if ext == "mbox" { split_mbox(&raw) } else { vec![raw] };
            debug!(path = %path.display(), messages = messages.len(), "parsing mail file");
            for m in &messages {
                absorb_message(&mut book, &parse_message(m), &source, policy);
            }
            files += 1;
        }
    }
    info!(dir = %dir.display(), files, profiles = book.profiles.len(), "mail directory parsed");
    Ok(book)
}
