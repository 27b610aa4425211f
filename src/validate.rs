// src/validate.rs
//! Field classifiers for extracted candidates.
//!
//! Every check takes an explicit [`Strictness`]: `Loose` answers "is this worth
//! keeping at all" (high recall), `Strict` answers "is this a clean value for
//! export" (high precision). Callers pick the mode; nothing here defaults it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::records::DonationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Loose,
}

static EMAIL_STRICT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

static PHONE_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\+?\d{1,2}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}$").unwrap()
});

static ADDRESS_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,5}\s\w+(?:\s\w+)*,\s\w+(?:\s\w+)*,\s[A-Z]{2}\s\d{5}$").unwrap()
});

static NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z\s\-']").unwrap());

/// Single words that show up capitalized in navigation, headings and role titles.
const NAME_STOP_WORDS: &[&str] = &[
    "contact", "email", "phone", "info", "support", "home", "about", "learn", "events",
    "application", "portal", "president", "vice", "director", "manager", "grantmaking",
    "carolina", "theatre", "community", "grant", "donor", "profile", "team", "staff", "fund",
    "advisor", "services", "resources", "scholarships", "mutual", "shares", "investment",
    "management", "reporting", "general", "inquiries", "media", "requests", "volunteer",
];

pub fn looks_like_email(s: &str, mode: Strictness) -> bool {
    match mode {
        Strictness::Strict => EMAIL_STRICT.is_match(s),
        Strictness::Loose => match s.find('@') {
            Some(at) => s[at + 1..].contains('.'),
            None => false,
        },
    }
}

pub fn looks_like_phone(s: &str, mode: Strictness) -> bool {
    match mode {
        Strictness::Strict => PHONE_STRICT.is_match(s.trim()),
        Strictness::Loose => s.chars().filter(|c| c.is_ascii_digit()).count() >= 7,
    }
}

pub fn looks_like_address(s: &str, mode: Strictness) -> bool {
    match mode {
        Strictness::Strict => ADDRESS_STRICT.is_match(s.trim()),
        Strictness::Loose => s.chars().any(|c| c.is_ascii_digit()) && s.contains(','),
    }
}

/// Heuristic for person/organization names pulled out of page blocks.
pub fn is_plausible_name(name: &str) -> bool {
    let name = name.trim();
    if name.chars().count() < 2 {
        return false;
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() == 1 {
        let starts_upper = name.chars().next().is_some_and(|c| c.is_uppercase());
        if !starts_upper || NAME_STOP_WORDS.contains(&name.to_lowercase().as_str()) {
            return false;
        }
    }
    let has_lower = name.chars().any(|c| c.is_lowercase());
    let has_upper = name.chars().any(|c| c.is_uppercase());
    if !(has_lower && has_upper) {
        return false;
    }
    !NAME_CHARS.is_match(name)
}

/// Phone candidates found in free text must look like a real number, not a year or a price.
pub fn is_contact_phone(candidate: &str) -> bool {
    let digits = candidate.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 10 && !candidate.trim_start().starts_with('$')
}

/// Classify a donation from the words around it.
pub fn donation_type(context: Option<&str>) -> DonationType {
    let Some(ctx) = context else {
        return DonationType::Unknown;
    };
    let ctx = ctx.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| ctx.contains(w));
    if has_any(&["monthly", "recurring", "regular"]) {
        DonationType::Recurring
    } else if has_any(&["one-time", "single", "special"]) {
        DonationType::OneTime
    } else if has_any(&["pledge", "promise", "commitment"]) {
        DonationType::Pledge
    } else {
        DonationType::Unknown
    }
}

/// Which field a rejected value was destined for; used in logs and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Email,
    Phone,
    Address,
    Name,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Email => "email",
            FieldKind::Phone => "phone",
            FieldKind::Address => "address",
            FieldKind::Name => "name",
        }
    }
}

/// Log + count a value that failed strict validation. Not an error: the value is just dropped.
pub fn note_rejection(field: FieldKind, value: &str) {
    tracing::warn!(field = field.as_str(), value, "value rejected by strict validator");
    metrics::counter!("harvest_validation_rejections_total", "field" => field.as_str())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_phone_rejects_short_and_accepts_grouped() {
        assert!(!looks_like_phone("1234", Strictness::Strict));
        assert!(looks_like_phone("(123) 456-7890", Strictness::Strict));
        assert!(looks_like_phone("+1 555.123.4567", Strictness::Strict));
    }

    #[test]
    fn loose_phone_counts_digits() {
        assert!(looks_like_phone("call 555-1234", Strictness::Loose));
        assert!(!looks_like_phone("ext 12", Strictness::Loose));
    }

    #[test]
    fn email_modes_differ() {
        assert!(looks_like_email("jane.doe@example.org", Strictness::Strict));
        assert!(!looks_like_email("jane@localhost", Strictness::Strict));
        assert!(looks_like_email("jane @ example . org", Strictness::Loose));
        assert!(!looks_like_email("jane.example.org", Strictness::Loose));
        assert!(!looks_like_email("jane.doe@example", Strictness::Loose));
    }

    #[test]
    fn address_modes_differ() {
        let good = "123 Main St, Springfield, IL 62701";
        assert!(looks_like_address(good, Strictness::Strict));
        assert!(!looks_like_address("Main St, Springfield", Strictness::Strict));
        assert!(looks_like_address("Suite 4, Springfield", Strictness::Loose));
        assert!(!looks_like_address("Springfield IL", Strictness::Loose));
    }

    #[test]
    fn name_heuristics() {
        assert!(is_plausible_name("Jane Doe"));
        assert!(is_plausible_name("Mary-Kate O'Neil"));
        assert!(is_plausible_name("Smithson"));
        assert!(!is_plausible_name("Contact"));
        assert!(!is_plausible_name("JANE DOE"));
        assert!(!is_plausible_name("jane doe"));
        assert!(!is_plausible_name("Jane Doe 2024"));
    }

    #[test]
    fn contact_phone_skips_prices_and_years() {
        assert!(is_contact_phone("(919) 555-0100"));
        assert!(!is_contact_phone("2024"));
        assert!(!is_contact_phone("$1000000000"));
    }

    #[test]
    fn donation_types_from_context() {
        assert_eq!(donation_type(Some("Monthly gift")), DonationType::Recurring);
        assert_eq!(donation_type(Some("a single gift")), DonationType::OneTime);
        assert_eq!(donation_type(Some("Pledge drive")), DonationType::Pledge);
        assert_eq!(donation_type(Some("annual gala")), DonationType::Unknown);
        assert_eq!(donation_type(None), DonationType::Unknown);
    }
}
