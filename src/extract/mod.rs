// src/extract/mod.rs
//! Extractors. Each turns one document (page, PDF, mail file, plain text) into a
//! [`ContactBook`](crate::records::ContactBook) batch for the caller to merge.

pub mod email;
pub mod html;
pub mod pdf;
pub mod text;

pub use html::{extract_page, PageExtract};
pub use pdf::{extract_pdf, store_pdf};
pub use text::{contains_key_data, extract_contact_info, normalize_text};
