// src/records/mod.rs
//! Typed contact records and the merge engine that reconciles them.

mod book;
mod clean;
mod donation;
mod merge;
mod profile;

pub use book::{BookSummary, ContactBook, MergeSummary};
pub use donation::{Donation, DonationType};
pub use merge::{add_donation, add_unique, merge_or_insert, parse_timestamp, DonationPolicy, MergeOutcome};
pub use profile::{Metadata, Profile};

pub(crate) use merge::{now_stamp, union_into};
