// src/records/profile.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::clean::{as_items, opt_string, string_list};
use super::Donation;

/// Per-field provenance. Open schema: unknown keys are carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default)]
    pub campaigns: Vec<String>,
    #[serde(default)]
    pub donation_types: Vec<String>,
    #[serde(default)]
    pub pdf_sources: Vec<String>,
    #[serde(default)]
    pub email_sources: Vec<String>,
    #[serde(default)]
    pub phone_sources: Vec<String>,
    #[serde(default)]
    pub address_sources: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Metadata {
    const LIST_KEYS: [&'static str; 6] = [
        "campaigns",
        "donation_types",
        "pdf_sources",
        "email_sources",
        "phone_sources",
        "address_sources",
    ];

    pub fn from_value(v: &Value) -> Self {
        let Some(obj) = v.as_object() else {
            return Self::default();
        };
        let mut m = Metadata {
            organization: opt_string(obj.get("organization")),
            campaigns: string_list(obj, &["campaigns"]),
            donation_types: string_list(obj, &["donation_types"]),
            pdf_sources: string_list(obj, &["pdf_sources"]),
            email_sources: string_list(obj, &["email_sources"]),
            phone_sources: string_list(obj, &["phone_sources"]),
            address_sources: string_list(obj, &["address_sources"]),
            extra: BTreeMap::new(),
        };
        for (k, val) in obj {
            if k != "organization" && !Self::LIST_KEYS.contains(&k.as_str()) {
                m.extra.insert(k.clone(), val.clone());
            }
        }
        m
    }

    /// Additive merge: lists are unioned, missing keys are filled, nothing is removed.
    pub fn absorb(&mut self, other: Metadata) {
        if self.organization.is_none() {
            self.organization = other.organization;
        }
        let pairs = [
            (&mut self.campaigns, other.campaigns),
            (&mut self.donation_types, other.donation_types),
            (&mut self.pdf_sources, other.pdf_sources),
            (&mut self.email_sources, other.email_sources),
            (&mut self.phone_sources, other.phone_sources),
            (&mut self.address_sources, other.address_sources),
        ];
        for (mine, theirs) in pairs {
            super::union_into(mine, theirs);
        }
        for (k, v) in other.extra {
            self.extra.entry(k).or_insert(v);
        }
    }
}

/// Accumulated contact/donor record for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default, rename = "phone_numbers")]
    pub phones: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub donations: Vec<Donation>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

const KNOWN_KEYS: &[&str] = &[
    "name", "first_name", "last_name", "source_url", "source", "context", "emails", "Emails",
    "email", "phone_numbers", "PhoneNumbers", "phones", "phone", "addresses", "Addresses",
    "address", "donations", "Donations", "donation_amount", "donation_context", "metadata",
    "first_seen", "last_seen",
];

impl Profile {
    /// Fresh profile stamped with the current local time.
    pub fn new(name: Option<String>, source_url: Option<String>) -> Self {
        let now = super::now_stamp();
        Self {
            name: name.filter(|n| !n.is_empty()),
            source_url,
            first_seen: Some(now.clone()),
            last_seen: Some(now),
            ..Default::default()
        }
    }

    /// Identity key: the name, when present and non-empty.
    pub fn identity(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    pub fn add_email(&mut self, email: impl Into<String>, source: Option<&str>) -> bool {
        let added = super::add_unique(&mut self.emails, email.into());
        if let Some(src) = source {
            super::add_unique(&mut self.metadata.email_sources, src.to_string());
        }
        added
    }

    pub fn add_phone(&mut self, phone: impl Into<String>, source: Option<&str>) -> bool {
        let added = super::add_unique(&mut self.phones, phone.into());
        if let Some(src) = source {
            super::add_unique(&mut self.metadata.phone_sources, src.to_string());
        }
        added
    }

    pub fn add_address(&mut self, address: impl Into<String>, source: Option<&str>) -> bool {
        let added = super::add_unique(&mut self.addresses, address.into());
        if let Some(src) = source {
            super::add_unique(&mut self.metadata.address_sources, src.to_string());
        }
        added
    }

    /// Lenient reader for dict-shaped profiles. Accepts the key spellings the
    /// different extractors and saved files use (`source`/`source_url`,
    /// `phone_numbers`/`PhoneNumbers`/`phone`, singular `email`, ...).
    pub fn from_value(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let mut p = Profile {
            name: opt_string(obj.get("name")),
            first_name: opt_string(obj.get("first_name")),
            last_name: opt_string(obj.get("last_name")),
            source_url: opt_string(obj.get("source_url")).or_else(|| opt_string(obj.get("source"))),
            context: opt_string(obj.get("context")),
            emails: string_list(obj, &["emails", "Emails", "email"]),
            phones: string_list(obj, &["phone_numbers", "PhoneNumbers", "phones", "phone"]),
            addresses: string_list(obj, &["addresses", "Addresses", "address"]),
            donations: Vec::new(),
            metadata: obj.get("metadata").map(Metadata::from_value).unwrap_or_default(),
            first_seen: opt_string(obj.get("first_seen")),
            last_seen: opt_string(obj.get("last_seen")),
            extra: BTreeMap::new(),
        };
        for key in ["donations", "Donations"] {
            if let Some(list) = obj.get(key) {
                for item in as_items(list) {
                    if let Some(d) = Donation::from_value(&item) {
                        if !p.donations.contains(&d) {
                            p.donations.push(d);
                        }
                    }
                }
            }
        }
        if let Some(amount) = opt_string(obj.get("donation_amount")) {
            let d = Donation::new(
                amount,
                p.source_url.clone(),
                opt_string(obj.get("donation_context")),
            );
            if !p.donations.contains(&d) {
                p.donations.push(d);
            }
        }
        if p.source_url.is_some() && obj.get("source_url").is_some() && obj.get("source").is_some() {
            // both spellings present: keep the second one instead of dropping it
            if let Some(src) = opt_string(obj.get("source")) {
                p.extra.insert("source".into(), Value::String(src));
            }
        }
        for (k, val) in obj {
            if !KNOWN_KEYS.contains(&k.as_str()) {
                p.extra.insert(k.clone(), val.clone());
            }
        }
        Some(p)
    }
}
