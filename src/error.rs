// src/error.rs
//! Failure taxonomy shared by the fetcher, extractors, merge engine and sources.
//!
//! Only [`HarvestError::Config`] is meant to stop a whole run. Everything else is
//! logged by the caller and the affected URL / document / item is skipped.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("fetch failed for {url} after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("could not parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("merge skipped for '{key}': {reason}")]
    Merge { key: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarvestError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that should terminate the run instead of skipping one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
