//! Application layer services implementing business logic.
//!
//! Services consume the [`crate::domain::repositories::UrlStorage`] trait and
//! expose the operations an HTTP layer calls.
//!
//! # Available Services
//!
//! - [`services::url_service::UrlService`] - Token issuance, saves, resolution, deletes and audit
pub mod services;
