// src/records/merge.rs
//! Entity reconciliation: fold an incoming profile into a list keyed by name.
//!
//! Matching is exact and case-sensitive on `name`. Profiles without a name are
//! never combined with anything. Every operation here is monotonic: values are
//! added, never removed, and re-applying the same input changes nothing.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Donation, Profile};
use crate::error::HarvestError;

/// How two donations are compared when deciding whether one is a repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationPolicy {
    /// Every field (amount, source, context, date, type) must match.
    #[default]
    FullRecord,
    /// Same amount from the same source is one donation.
    AmountAndSource,
}

impl DonationPolicy {
    fn same(self, a: &Donation, b: &Donation) -> bool {
        match self {
            DonationPolicy::FullRecord => a == b,
            DonationPolicy::AmountAndSource => a.amount == b.amount && a.source == b.source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Merged,
}

/// Append `item` unless an equal string is already present. No normalization.
pub fn add_unique(list: &mut Vec<String>, item: impl Into<String>) -> bool {
    let item = item.into();
    if list.contains(&item) {
        return false;
    }
    list.push(item);
    true
}

pub fn add_donation(list: &mut Vec<Donation>, donation: Donation, policy: DonationPolicy) -> bool {
    if list.iter().any(|d| policy.same(d, &donation)) {
        return false;
    }
    list.push(donation);
    true
}

pub(crate) fn union_into(mine: &mut Vec<String>, theirs: Vec<String>) {
    for item in theirs {
        add_unique(mine, item);
    }
}

pub(crate) fn now_stamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Accepts ISO-8601 (`T` separator, optional fraction/offset), the space-separated
/// form new profiles are stamped with, and bare dates.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, HarvestError> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| HarvestError::parse("timestamp", format!("unrecognized format: {s:?}")))
}

#[derive(Clone, Copy)]
enum Pick {
    Latest,
    Earliest,
}

/// Resolve one timestamp field. A missing incoming value changes nothing; a value
/// that does not parse leaves the existing one in place and is reported.
fn merge_stamp(key: &str, field: &str, existing: &mut Option<String>, incoming: Option<String>, pick: Pick) {
    let Some(theirs) = incoming else {
        return;
    };
    let Some(mine) = existing.as_deref() else {
        if let Err(e) = parse_timestamp(&theirs) {
            report_merge_failure(key, field, &e);
            return;
        }
        *existing = Some(theirs);
        return;
    };
    let (a, b) = match (parse_timestamp(mine), parse_timestamp(&theirs)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            report_merge_failure(key, field, &e);
            return;
        }
    };
    let take_theirs = match pick {
        Pick::Latest => b > a,
        Pick::Earliest => b < a,
    };
    if take_theirs {
        *existing = Some(theirs);
    }
}

fn report_merge_failure(key: &str, field: &str, err: &HarvestError) {
    let failure = HarvestError::Merge {
        key: key.to_string(),
        reason: format!("{field}: {err}"),
    };
    warn!(error = %failure, "keeping previous value");
    metrics::counter!("harvest_merge_failures_total", "field" => field.to_string()).increment(1);
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Fold `incoming` into `target`. Used for name matches and for reconciling
/// structurally identical unnamed entries.
pub(crate) fn absorb_profile(target: &mut Profile, incoming: Profile, policy: DonationPolicy) {
    let key = target.identity().unwrap_or("<unnamed>").to_string();

    union_into(&mut target.emails, incoming.emails);
    union_into(&mut target.phones, incoming.phones);
    union_into(&mut target.addresses, incoming.addresses);
    for d in incoming.donations {
        add_donation(&mut target.donations, d, policy);
    }

    merge_stamp(&key, "last_seen", &mut target.last_seen, incoming.last_seen, Pick::Latest);
    merge_stamp(&key, "first_seen", &mut target.first_seen, incoming.first_seen, Pick::Earliest);

    fill(&mut target.name, incoming.name);
    fill(&mut target.first_name, incoming.first_name);
    fill(&mut target.last_name, incoming.last_name);
    fill(&mut target.source_url, incoming.source_url);
    fill(&mut target.context, incoming.context);

    target.metadata.absorb(incoming.metadata);
    for (k, v) in incoming.extra {
        target.extra.entry(k).or_insert(v);
    }
}

/// Merge by name or append. Mutates `profiles` in place.
pub fn merge_or_insert(profiles: &mut Vec<Profile>, incoming: Profile, policy: DonationPolicy) -> MergeOutcome {
    let found = incoming
        .identity()
        .and_then(|key| profiles.iter().position(|p| p.identity() == Some(key)));

    match found {
        Some(idx) => {
            debug!(name = incoming.identity().unwrap_or_default(), "merging into existing profile");
            absorb_profile(&mut profiles[idx], incoming, policy);
            metrics::counter!("harvest_profiles_merged_total").increment(1);
            MergeOutcome::Merged
        }
        None => {
            profiles.push(incoming);
            metrics::counter!("harvest_profiles_inserted_total").increment(1);
            MergeOutcome::Inserted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Profile {
        let mut p = Profile::new(Some(name.into()), None);
        p.first_seen = Some("2024-01-01 10:00:00".into());
        p.last_seen = Some("2024-01-01 10:00:00".into());
        p
    }

    #[test]
    fn add_unique_keeps_order() {
        let mut v = vec!["b".to_string()];
        assert!(add_unique(&mut v, "a"));
        assert!(!add_unique(&mut v, "b"));
        assert_eq!(v, vec!["b", "a"]);
    }

    #[test]
    fn jane_doe_emails_are_unioned() {
        let mut profiles = Vec::new();
        let mut a = named("Jane Doe");
        a.add_email("j@x.com", None);
        let mut b = named("Jane Doe");
        b.add_email("j@x.com", None);
        b.add_email("jane@y.org", None);

        assert_eq!(merge_or_insert(&mut profiles, a, DonationPolicy::default()), MergeOutcome::Inserted);
        assert_eq!(merge_or_insert(&mut profiles, b, DonationPolicy::default()), MergeOutcome::Merged);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].emails, vec!["j@x.com", "jane@y.org"]);
    }

    #[test]
    fn names_match_case_sensitively() {
        let mut profiles = Vec::new();
        merge_or_insert(&mut profiles, named("Jane Doe"), DonationPolicy::default());
        merge_or_insert(&mut profiles, named("jane doe"), DonationPolicy::default());
        assert_eq!(profiles.len(), 2);
    }

    #[test]
    fn unnamed_profiles_stay_apart() {
        let mut profiles = Vec::new();
        let mut a = Profile::new(None, None);
        a.add_email("x@y.org", None);
        let b = a.clone();
        merge_or_insert(&mut profiles, a, DonationPolicy::default());
        merge_or_insert(&mut profiles, b, DonationPolicy::default());
        assert_eq!(profiles.len(), 2);
    }

    #[test]
    fn last_seen_takes_the_later_value() {
        let mut profiles = vec![named("Ann Lee")];
        let mut later = named("Ann Lee");
        later.last_seen = Some("2024-06-01T08:30:00".into());
        later.first_seen = Some("2023-12-31".into());
        merge_or_insert(&mut profiles, later, DonationPolicy::default());
        assert_eq!(profiles[0].last_seen.as_deref(), Some("2024-06-01T08:30:00"));
        assert_eq!(profiles[0].first_seen.as_deref(), Some("2023-12-31"));
    }

    #[test]
    fn malformed_last_seen_keeps_previous_value() {
        let mut profiles = vec![named("Ann Lee")];
        let mut bad = named("Ann Lee");
        bad.last_seen = Some("yesterday-ish".into());
        bad.add_phone("555-010-1234", None);
        merge_or_insert(&mut profiles, bad, DonationPolicy::default());
        assert_eq!(profiles[0].last_seen.as_deref(), Some("2024-01-01 10:00:00"));
        assert_eq!(profiles[0].phones, vec!["555-010-1234"]);
    }

    #[test]
    fn amount_and_source_policy_collapses_context_changes() {
        let a = Donation::new("$50", Some("gala.pdf".into()), Some("monthly".into())).with_date("2024-01-01");
        let b = Donation::new("$50", Some("gala.pdf".into()), Some("special".into())).with_date("2024-02-01");

        let mut full = vec![a.clone()];
        assert!(add_donation(&mut full, b.clone(), DonationPolicy::FullRecord));
        assert_eq!(full.len(), 2);

        let mut loose = vec![a];
        assert!(!add_donation(&mut loose, b, DonationPolicy::AmountAndSource));
        assert_eq!(loose.len(), 1);
    }

    #[test]
    fn merging_twice_is_a_no_op() {
        let mut profiles = Vec::new();
        let mut p = named("Sam Roe");
        p.add_email("sam@roe.org", Some("html"));
        p.donations.push(Donation::new("$10", None, None));
        p.extra.insert("tier".into(), serde_json::json!("gold"));

        merge_or_insert(&mut profiles, p.clone(), DonationPolicy::default());
        let snapshot = profiles.clone();
        merge_or_insert(&mut profiles, p, DonationPolicy::default());
        assert_eq!(profiles, snapshot);
    }

    #[test]
    fn missing_scalars_are_filled_but_never_overwritten() {
        let mut profiles = vec![named("Bo Park")];
        let mut inc = named("Bo Park");
        inc.source_url = Some("https://a.org".into());
        inc.metadata.organization = Some("Arts Fund".into());
        merge_or_insert(&mut profiles, inc, DonationPolicy::default());
        let mut inc2 = named("Bo Park");
        inc2.source_url = Some("https://b.org".into());
        merge_or_insert(&mut profiles, inc2, DonationPolicy::default());
        assert_eq!(profiles[0].source_url.as_deref(), Some("https://a.org"));
        assert_eq!(profiles[0].metadata.organization.as_deref(), Some("Arts Fund"));
    }

    #[test]
    fn timestamps_in_all_accepted_forms_parse() {
        assert!(parse_timestamp("2024-01-02T03:04:05").is_ok());
        assert!(parse_timestamp("2024-01-02T03:04:05.123").is_ok());
        assert!(parse_timestamp("2024-01-02 03:04:05").is_ok());
        assert!(parse_timestamp("2024-01-02T03:04:05Z").is_ok());
        assert!(parse_timestamp("2024-01-02").is_ok());
        assert!(parse_timestamp("Jan 2").is_err());
    }
}
