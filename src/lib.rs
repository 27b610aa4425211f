// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod records;
pub mod sources;
pub mod telemetry;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::error::{HarvestError, Result};
pub use crate::records::{ContactBook, Donation, DonationPolicy, Profile};
