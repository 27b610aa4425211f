// src/records/book.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::clean::{as_items, item_string};
use super::merge::{absorb_profile, add_donation, add_unique, merge_or_insert, MergeOutcome};
use super::{Donation, DonationPolicy, Profile};
use crate::error::{HarvestError, Result};

/// Accumulator for one extraction run. Every field is an ordered sequence,
/// deduplicated on its own; nothing is ever removed by a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactBook {
    #[serde(rename = "Profiles", default)]
    pub profiles: Vec<Profile>,
    #[serde(rename = "Emails", default)]
    pub emails: Vec<String>,
    #[serde(rename = "PhoneNumbers", default)]
    pub phone_numbers: Vec<String>,
    #[serde(rename = "Addresses", default)]
    pub addresses: Vec<String>,
    #[serde(rename = "Donations", default)]
    pub donations: Vec<Donation>,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "PDFLinks", default)]
    pub pdf_links: Vec<String>,
    #[serde(rename = "Entities", default)]
    pub entities: Vec<Value>,
    #[serde(rename = "Donors", default)]
    pub donors: Vec<Profile>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub merged: usize,
}

impl MergeSummary {
    fn count(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Merged => self.merged += 1,
        }
    }
}

/// Counts reported next to each `/search` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub emails_count: usize,
    pub names_count: usize,
    pub addresses_count: usize,
    pub pdf_links_count: usize,
    pub profiles_count: usize,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
            && self.emails.is_empty()
            && self.phone_numbers.is_empty()
            && self.addresses.is_empty()
            && self.donations.is_empty()
            && self.names.is_empty()
            && self.pdf_links.is_empty()
            && self.entities.is_empty()
            && self.donors.is_empty()
    }

    pub fn summary(&self) -> BookSummary {
        BookSummary {
            emails_count: self.emails.len(),
            names_count: self.names.len(),
            addresses_count: self.addresses.len(),
            pdf_links_count: self.pdf_links.len(),
            profiles_count: self.profiles.len(),
        }
    }

    pub fn add_email(&mut self, email: impl Into<String>) -> bool {
        add_unique(&mut self.emails, email)
    }

    pub fn add_phone(&mut self, phone: impl Into<String>) -> bool {
        add_unique(&mut self.phone_numbers, phone)
    }

    pub fn add_address(&mut self, address: impl Into<String>) -> bool {
        add_unique(&mut self.addresses, address)
    }

    pub fn add_name(&mut self, name: impl Into<String>) -> bool {
        add_unique(&mut self.names, name)
    }

    pub fn add_pdf_link(&mut self, link: impl Into<String>) -> bool {
        add_unique(&mut self.pdf_links, link)
    }

    pub fn add_donation(&mut self, donation: Donation, policy: DonationPolicy) -> bool {
        add_donation(&mut self.donations, donation, policy)
    }

    /// Entities are free-form objects; two are the same when their JSON text is.
    pub fn add_entity(&mut self, entity: Value) -> bool {
        let key = entity.to_string();
        if self.entities.iter().any(|e| e.to_string() == key) {
            return false;
        }
        self.entities.push(entity);
        true
    }

    pub fn add_profile(&mut self, profile: Profile, policy: DonationPolicy) -> MergeOutcome {
        merge_or_insert(&mut self.profiles, profile, policy)
    }

    /// Donors are keyed by name like profiles, but kept in their own list.
    pub fn add_donor(&mut self, donor: Profile, policy: DonationPolicy) -> MergeOutcome {
        merge_or_insert(&mut self.donors, donor, policy)
    }

    /// Batch update: fold every field of `other` into `self`.
    pub fn merge(&mut self, other: ContactBook, policy: DonationPolicy) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for p in other.profiles {
            summary.count(self.add_profile(p, policy));
        }
        for d in other.donors {
            self.add_donor(d, policy);
        }
        self.absorb_flat(other.emails, other.phone_numbers, other.addresses, other.names, other.pdf_links);
        for d in other.donations {
            self.add_donation(d, policy);
        }
        for e in other.entities {
            self.add_entity(e);
        }
        summary
    }

    /// Reconcile with a previously saved book. Same as [`merge`](Self::merge),
    /// except an unnamed profile is only appended when no identical one exists,
    /// so saving the same batch twice does not grow the file.
    pub fn absorb(&mut self, other: ContactBook, policy: DonationPolicy) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let ContactBook {
            profiles,
            emails,
            phone_numbers,
            addresses,
            donations,
            names,
            pdf_links,
            entities,
            donors,
        } = other;

        for p in profiles {
            if p.identity().is_none() {
                if let Some(twin) = self.profiles.iter_mut().find(|q| q.identity().is_none() && same_fields(q, &p)) {
                    absorb_profile(twin, p, policy);
                    summary.merged += 1;
                } else {
                    self.profiles.push(p);
                    summary.inserted += 1;
                }
                continue;
            }
            summary.count(self.add_profile(p, policy));
        }
        for d in donors {
            self.add_donor(d, policy);
        }
        self.absorb_flat(emails, phone_numbers, addresses, names, pdf_links);
        for d in donations {
            self.add_donation(d, policy);
        }
        for e in entities {
            self.add_entity(e);
        }
        summary
    }

    fn absorb_flat(
        &mut self,
        emails: Vec<String>,
        phones: Vec<String>,
        addresses: Vec<String>,
        names: Vec<String>,
        pdf_links: Vec<String>,
    ) {
        super::union_into(&mut self.emails, emails);
        super::union_into(&mut self.phone_numbers, phones);
        super::union_into(&mut self.addresses, addresses);
        super::union_into(&mut self.names, names);
        super::union_into(&mut self.pdf_links, pdf_links);
    }

    /// Cleaning pass over arbitrary JSON (a saved file, another tool's output).
    /// Scalars become one-element sequences; items that cannot be read as the
    /// field's type are dropped. Anything other than an object is an error.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(obj) = value else {
            return Err(HarvestError::parse("contact book", "top level is not a JSON object"));
        };
        let policy = DonationPolicy::FullRecord;
        let mut book = ContactBook::new();

        let strings = |key: &str| -> Vec<String> {
            obj.get(key)
                .map(|v| as_items(v).iter().filter_map(item_string).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default()
        };
        book.absorb_flat(
            strings("Emails"),
            strings("PhoneNumbers"),
            strings("Addresses"),
            strings("Names"),
            strings("PDFLinks"),
        );

        for item in obj.get("Profiles").map(as_items).unwrap_or_default() {
            match Profile::from_value(&item) {
                Some(p) => {
                    // cleaning keeps unnamed duplicates apart, like any other merge
                    book.add_profile(p, policy);
                }
                None => debug!(item = %item, "dropping non-object profile entry"),
            }
        }
        for item in obj.get("Donors").map(as_items).unwrap_or_default() {
            if let Some(p) = Profile::from_value(&item) {
                book.add_donor(p, policy);
            }
        }
        for item in obj.get("Donations").map(as_items).unwrap_or_default() {
            if let Some(d) = Donation::from_value(&item) {
                book.add_donation(d, policy);
            }
        }
        for item in obj.get("Entities").map(as_items).unwrap_or_default() {
            book.add_entity(item);
        }
        Ok(book)
    }
}

fn same_fields(a: &Profile, b: &Profile) -> bool {
    a.emails == b.emails
        && a.phones == b.phones
        && a.addresses == b.addresses
        && a.donations == b.donations
        && a.source_url == b.source_url
}
