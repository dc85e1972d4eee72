//! Infrastructure layer for external integrations.
//!
//! Implements the interfaces defined by the domain layer.
//!
//! # Modules
//!
//! - [`audit`] - Audit event fan-out to file and webhook subscribers
//! - [`persistence`] - Memory, file and PostgreSQL storage backends

pub mod audit;
pub mod persistence;
