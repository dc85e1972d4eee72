//! Storage backends implementing [`crate::domain::repositories::UrlStorage`].
//!
//! - [`MemoryStorage`] - process-lifetime dual map
//! - [`FileStorage`] - dual map mirrored to a JSON file with atomic rewrites
//! - [`PgUrlStorage`] - PostgreSQL table with tombstones and transactional batches
//!
//! [`StorageKind`] picks one of them at startup.

pub mod file_storage;
pub mod memory_storage;
pub mod pg_url_storage;
pub mod storage;
mod url_index;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use pg_url_storage::{PgSettings, PgUrlStorage};
pub use storage::StorageKind;
