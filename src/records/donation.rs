// src/records/donation.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::clean::{item_string, opt_string};
use crate::validate::donation_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DonationType {
    Recurring,
    #[serde(rename = "one-time")]
    OneTime,
    Pledge,
    #[default]
    Unknown,
}

impl DonationType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "recurring" => Self::Recurring,
            "one-time" | "one_time" | "onetime" => Self::OneTime,
            "pledge" => Self::Pledge,
            _ => Self::Unknown,
        }
    }
}

/// One observed gift. `amount` stays raw (currency symbol, separators) and is never summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub date: String,
    #[serde(rename = "type", default)]
    pub kind: DonationType,
}

impl Donation {
    /// Build a donation observed today; the type is inferred from `context`.
    pub fn new(amount: impl Into<String>, source: Option<String>, context: Option<String>) -> Self {
        let kind = donation_type(context.as_deref());
        Self {
            amount: amount.into(),
            source,
            context,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            kind,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Lenient reader for dict-shaped donations coming from saved files or other tools.
    /// Items without an amount are not donations and yield `None`.
    pub fn from_value(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let amount = obj.get("amount").and_then(item_string)?;
        if amount.trim().is_empty() {
            return None;
        }
        let source = opt_string(obj.get("source"));
        let context = opt_string(obj.get("context"));
        let mut d = Donation::new(amount, source, context);
        if let Some(date) = obj.get("date").and_then(item_string) {
            d.date = date;
        }
        if let Some(kind) = obj.get("type").and_then(Value::as_str) {
            d.kind = DonationType::parse(kind);
        }
        Some(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_serializes_with_hyphen() {
        let d = Donation::new("$50", None, Some("one-time gift".into())).with_date("2024-05-01");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["type"], "one-time");
        assert_eq!(v["date"], "2024-05-01");
        assert!(v.get("source").is_none());
    }

    #[test]
    fn from_value_requires_amount() {
        assert!(Donation::from_value(&json!({"context": "monthly"})).is_none());
        assert!(Donation::from_value(&json!({"amount": ""})).is_none());
        let d = Donation::from_value(&json!({"amount": 250, "context": "Monthly donor"})).unwrap();
        assert_eq!(d.amount, "250");
        assert_eq!(d.kind, DonationType::Recurring);
    }

    #[test]
    fn explicit_type_wins_over_context() {
        let d = Donation::from_value(&json!({
            "amount": "$1,000",
            "context": "monthly",
            "type": "pledge",
            "date": "2023-01-01"
        }))
        .unwrap();
        assert_eq!(d.kind, DonationType::Pledge);
        assert_eq!(d.date, "2023-01-01");
    }

    #[test]
    fn empty_date_survives_a_reload() {
        let d = Donation::new("$75", None, None).with_date("");
        let back = Donation::from_value(&serde_json::to_value(&d).unwrap()).unwrap();
        assert_eq!(back, d);
    }
}
