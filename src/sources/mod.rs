// src/sources/mod.rs
//! Contact-system clients. Each source returns flat [`ContactRecord`]s;
//! [`import_contacts`] folds them into a book as profiles.

pub mod google;
pub mod microsoft;
pub mod wordpress;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::records::{ContactBook, DonationPolicy, MergeSummary, Profile};

pub use google::GooglePeople;
pub use microsoft::{GraphEndpoints, MicrosoftGraph};
pub use wordpress::WordPress;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl ContactRecord {
    fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.emails.is_empty() && self.phones.is_empty() && self.addresses.is_empty()
    }
}

#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn fetch_contacts(&self) -> Result<Vec<ContactRecord>>;
    fn name(&self) -> &'static str;
}

/// Pull every contact from `source` and merge it into `book` as a profile tagged
/// with the source name. Blank records are dropped.
pub async fn import_contacts(
    source: &dyn ContactSource,
    book: &mut ContactBook,
    policy: DonationPolicy,
) -> Result<MergeSummary> {
    let records = source.fetch_contacts().await?;
    let fetched_at = chrono::Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string();
    let mut batch = ContactBook::new();

    for r in records.into_iter().filter(|r| !r.is_blank()) {
        let src = source.name();
        let name = r.name.trim().to_string();
        let mut p = Profile::new(Some(name.clone()), Some(src.to_string()));
        if !name.is_empty() {
            p.context = Some(format!("{src} contact for {name}"));
            batch.add_name(name);
        }
        for e in r.emails.into_iter().filter(|e| !e.is_empty()) {
            p.add_email(e.as_str(), Some(src));
            batch.add_email(e);
        }
        for ph in r.phones.into_iter().filter(|p| !p.is_empty()) {
            p.add_phone(ph.as_str(), Some(src));
            batch.add_phone(ph);
        }
        for a in r.addresses.into_iter().filter(|a| !a.is_empty()) {
            p.add_address(a.as_str(), Some(src));
            batch.add_address(a);
        }
        p.extra.insert("fetched_at".into(), serde_json::Value::String(fetched_at.clone()));
        batch.add_profile(p, policy);
    }

    let summary = book.merge(batch, policy);
    info!(
        source = source.name(),
        inserted = summary.inserted,
        merged = summary.merged,
        "contacts imported"
    );
    Ok(summary)
}
