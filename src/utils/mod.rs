//! Helpers shared across layers.
//!
//! - [`code_generator`] - Random token generation
//! - [`db_error`] - PostgreSQL constraint violation classification

pub mod code_generator;
pub mod db_error;
