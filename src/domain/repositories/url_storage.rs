//! Storage contract shared by the memory, file and relational backends.

use crate::domain::entities::{NewRecord, SaveOutcome, UrlRecord};
use crate::error::AppError;
use async_trait::async_trait;

/// Repository interface for URL records.
///
/// Implementations synchronize internally; callers never lock around them.
/// Deadlines are enforced by the caller dropping the returned future.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::MemoryStorage`] - process-lifetime maps
/// - [`crate::infrastructure::persistence::FileStorage`] - maps mirrored to a JSON file
/// - [`crate::infrastructure::persistence::PgUrlStorage`] - PostgreSQL table
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrlStorage: Send + Sync {
    /// Binds `token` to `url` unless the URL already has an active record.
    ///
    /// # Returns
    ///
    /// - `Ok(SaveOutcome::Created(token))` when a new record was inserted
    /// - `Ok(SaveOutcome::AlreadyExists(existing))` when the URL is already stored
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if `token` is already bound to another URL.
    /// Returns [`AppError::Internal`] / [`AppError::Unavailable`] on backend failures.
    async fn save(
        &self,
        token: &str,
        url: &str,
        user_id: &str,
        base_url: &str,
    ) -> Result<SaveOutcome, AppError>;

    /// Applies a list of `(token, url)` pairs.
    ///
    /// All-or-nothing when [`UrlStorage::atomic_batches`] is true. Otherwise
    /// records are applied in order and URLs that are already stored are skipped.
    ///
    /// Returns one outcome per record, in input order. A skipped record
    /// reports the token the URL is already bound to.
    ///
    /// # Errors
    ///
    /// Transactional backends return [`AppError::AlreadyExists`] when a URL in
    /// the batch is already stored, after rolling the whole batch back.
    async fn save_batch(
        &self,
        records: Vec<NewRecord>,
        user_id: &str,
        base_url: &str,
    ) -> Result<Vec<SaveOutcome>, AppError>;

    /// Resolves a token to its original URL.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the token was never stored and
    /// [`AppError::Gone`] if it was deleted.
    async fn get(&self, token: &str) -> Result<String, AppError>;

    /// Returns true if the token is bound to any record, deleted or not.
    async fn token_exists(&self, token: &str) -> Result<bool, AppError>;

    /// Lists the active records owned by `user_id`. Empty, not an error, when
    /// the user owns nothing.
    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<UrlRecord>, AppError>;

    /// Tombstones the records in `tokens` owned by `user_id`.
    ///
    /// Tokens owned by someone else or already deleted are skipped silently.
    /// Returns the number of records flipped.
    async fn delete_by_tokens(&self, user_id: &str, tokens: &[String]) -> Result<u64, AppError>;

    /// Liveness probe. A no-op for backends without a network connection.
    async fn ping(&self) -> Result<(), AppError>;

    /// Flushes buffered state and releases resources. Called once at shutdown.
    async fn close(&self) -> Result<(), AppError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Whether `save_batch` is all-or-nothing on this backend.
    fn atomic_batches(&self) -> bool;
}
