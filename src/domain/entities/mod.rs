//! Core domain entities.
//!
//! - [`UrlRecord`] - A persisted short token to URL mapping
//! - [`NewRecord`] - A `(token, url)` pair for batch saves
//! - [`BatchItem`] / [`BatchResult`] - Batch shortening request and response rows
//! - [`SaveOutcome`] - Result of an idempotent save

pub mod url_record;

pub use url_record::{BatchItem, BatchResult, NewRecord, SaveOutcome, UrlRecord};
