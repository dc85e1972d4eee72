//! Repository trait definitions for the domain layer.
//!
//! The storage contract is implemented by the backends in
//! `crate::infrastructure::persistence`. A `mockall` mock is generated for
//! unit tests.
//!
//! # Testing
//!
//! See integration tests in `tests/storage_*.rs` and `tests/repository_pg.rs`.

pub mod url_storage;

pub use url_storage::UrlStorage;

#[cfg(test)]
pub use url_storage::MockUrlStorage;
