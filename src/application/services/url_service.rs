//! URL shortening facade.
//!
//! Composes token issuance, storage, audit notification and the deletion
//! pipeline into the operations an HTTP layer calls.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use url::Url;

use crate::domain::audit_event::{AuditAction, AuditEvent};
use crate::domain::delete_request::DeleteRequest;
use crate::domain::deletion_worker::DeletionPipeline;
use crate::domain::entities::{BatchItem, BatchResult, NewRecord, SaveOutcome, UrlRecord};
use crate::domain::repositories::UrlStorage;
use crate::error::AppError;
use crate::infrastructure::audit::{AUDIT_DRAIN_TIMEOUT, AUDIT_QUEUE_CAPACITY, AuditPublisher, AuditQueue};
use crate::utils::code_generator::{TOKEN_BYTES, generate_token};

/// Fresh tokens tried before giving up with [`AppError::TokenSpaceExhausted`].
pub const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Per-service settings.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Prefix for short URLs, ending with `/`.
    pub base_url: String,
    /// Deadline applied to each storage-bound operation.
    pub request_timeout: Duration,
}

/// Service Facade over one storage backend.
///
/// Every storage-bound call runs under `request_timeout`; when it expires the
/// in-flight storage future is dropped and [`AppError::Timeout`] is returned.
pub struct UrlService<S: UrlStorage + ?Sized> {
    storage: Arc<S>,
    deletion: DeletionPipeline,
    audit: Arc<AuditPublisher>,
    audit_queue: AuditQueue,
    base_url: String,
    request_timeout: Duration,
}

impl<S: UrlStorage + ?Sized + 'static> UrlService<S> {
    pub fn new(
        storage: Arc<S>,
        deletion: DeletionPipeline,
        audit: Arc<AuditPublisher>,
        settings: ServiceSettings,
    ) -> Self {
        let audit_queue = AuditQueue::start(Arc::clone(&audit), AUDIT_QUEUE_CAPACITY);
        Self {
            storage,
            deletion,
            audit,
            audit_queue,
            base_url: settings.base_url,
            request_timeout: settings.request_timeout,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn audit(&self) -> &Arc<AuditPublisher> {
        &self.audit
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn short_url(&self, token: &str) -> String {
        format!("{}{token}", self.base_url)
    }

    /// Issues a token that is not bound to any record, deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::TokenSpaceExhausted`] after [`MAX_TOKEN_ATTEMPTS`]
    /// collisions. A colliding token is never handed out.
    pub async fn issue_token(&self) -> Result<String, AppError> {
        self.with_deadline(self.issue_token_avoiding(&HashSet::new()))
            .await
    }

    /// Binds `url` to `token`, or to a freshly issued token when `token` is
    /// empty.
    ///
    /// Saving an already-stored URL returns [`SaveOutcome::AlreadyExists`]
    /// with the existing token. A `shorten` audit event is published only for
    /// new records.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if `url` is not an absolute http(s) URL
    /// - [`AppError::Conflict`] if `token` is bound to another URL
    /// - [`AppError::Timeout`] if the deadline expires
    pub async fn save(&self, token: &str, url: &str, user_id: &str) -> Result<SaveOutcome, AppError> {
        validate_url(url)?;

        let outcome = self
            .with_deadline(async {
                let token = if token.is_empty() {
                    self.issue_token_avoiding(&HashSet::new()).await?
                } else {
                    token.to_string()
                };
                self.storage
                    .save(&token, url, user_id, &self.base_url)
                    .await
            })
            .await?;

        match &outcome {
            SaveOutcome::Created(token) => {
                tracing::debug!(%token, %user_id, "Short URL created");
                self.record_audit(AuditAction::Shorten, user_id, url);
            }
            SaveOutcome::AlreadyExists(token) => {
                tracing::debug!(%token, "URL already shortened");
            }
        }

        Ok(outcome)
    }

    /// Stores caller-supplied `(token, url)` pairs.
    ///
    /// Atomic only when the backend reports
    /// [`UrlStorage::atomic_batches`]; otherwise records before a failing one
    /// stay applied.
    pub async fn save_batch(
        &self,
        records: Vec<NewRecord>,
        user_id: &str,
    ) -> Result<Vec<SaveOutcome>, AppError> {
        for record in &records {
            validate_url(&record.original_url)?;
        }

        let outcomes = self
            .with_deadline(self.storage.save_batch(records.clone(), user_id, &self.base_url))
            .await?;

        for (record, outcome) in records.iter().zip(&outcomes) {
            if matches!(outcome, SaveOutcome::Created(_)) {
                self.record_audit(AuditAction::Shorten, user_id, &record.original_url);
            }
        }

        Ok(outcomes)
    }

    /// Shortens a batch of URLs, echoing each item's correlation id.
    ///
    /// A URL repeated inside the batch gets one token. On backends without
    /// atomic batches, a URL that is already stored reports its existing
    /// short URL.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] before touching storage if any URL is
    /// invalid. Transactional backends return [`AppError::AlreadyExists`] and
    /// store nothing if any URL is already stored.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        user_id: &str,
    ) -> Result<Vec<BatchResult>, AppError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        for item in &items {
            validate_url(&item.original_url)?;
        }

        let tokens = self
            .with_deadline(async {
                let mut issued: HashSet<String> = HashSet::new();
                let mut by_url: HashMap<String, String> = HashMap::new();
                let mut records = Vec::new();

                for item in &items {
                    if by_url.contains_key(&item.original_url) {
                        continue;
                    }
                    let token = self.issue_token_avoiding(&issued).await?;
                    issued.insert(token.clone());
                    by_url.insert(item.original_url.clone(), token.clone());
                    records.push(NewRecord::new(token, item.original_url.clone()));
                }

                let outcomes = self
                    .storage
                    .save_batch(records.clone(), user_id, &self.base_url)
                    .await?;

                for (record, outcome) in records.iter().zip(outcomes) {
                    match outcome {
                        SaveOutcome::Created(_) => {
                            self.record_audit(AuditAction::Shorten, user_id, &record.original_url)
                        }
                        SaveOutcome::AlreadyExists(existing) => {
                            by_url.insert(record.original_url.clone(), existing);
                        }
                    }
                }

                Ok(by_url)
            })
            .await?;

        tracing::debug!(items = items.len(), distinct = tokens.len(), %user_id, "Batch shortened");

        Ok(items
            .into_iter()
            .map(|item| {
                let token = tokens
                    .get(&item.original_url)
                    .map(String::as_str)
                    .unwrap_or_default();
                BatchResult {
                    correlation_id: item.correlation_id,
                    short_url: self.short_url(token),
                }
            })
            .collect())
    }

    /// Looks up the original URL without publishing an audit event.
    ///
    /// # Errors
    ///
    /// [`AppError::NotFound`] for unknown tokens, [`AppError::Gone`] for
    /// deleted ones.
    pub async fn resolve(&self, token: &str) -> Result<String, AppError> {
        self.with_deadline(self.storage.get(token)).await
    }

    /// Resolves `token` for a redirect and publishes a `follow` event.
    pub async fn follow(&self, token: &str, user_id: &str) -> Result<String, AppError> {
        let url = self.resolve(token).await?;
        self.record_audit(AuditAction::Follow, user_id, &url);
        Ok(url)
    }

    /// Active records owned by `user_id`. Empty when there are none.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<UrlRecord>, AppError> {
        self.with_deadline(self.storage.get_all_for_user(user_id))
            .await
    }

    /// Hands a delete request to the pipeline and returns without waiting for
    /// it to be applied.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] if the queue is full past its bounded
    /// wait or the pipeline has stopped.
    pub async fn enqueue_delete(&self, user_id: &str, tokens: Vec<String>) -> Result<(), AppError> {
        self.deletion
            .enqueue(DeleteRequest::new(user_id, tokens))
            .await
    }

    pub async fn pending_deletes(&self) -> usize {
        self.deletion.pending().await
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.with_deadline(self.storage.ping()).await
    }

    /// Hands an audit event to the bounded delivery queue.
    ///
    /// Never fails and never waits for delivery. Without subscribers, outside
    /// a tokio runtime, or when the queue is full, the event is dropped.
    pub fn record_audit(&self, action: AuditAction, user_id: &str, url: &str) {
        if self.audit.is_empty() {
            return;
        }

        if !self.audit_queue.push(AuditEvent::new(action, user_id, url)) {
            tracing::debug!(?action, "Audit event dropped");
        }
    }

    /// Drains the deletion pipeline and the audit queue, then closes storage.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.deletion.shutdown().await;
        self.audit_queue.shutdown(AUDIT_DRAIN_TIMEOUT).await;
        self.storage.close().await.inspect_err(|e| {
            tracing::error!(backend = self.storage.backend_name(), error = %e, "Failed to close storage");
        })
    }

    async fn issue_token_avoiding(&self, reserved: &HashSet<String>) -> Result<String, AppError> {
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = generate_token(TOKEN_BYTES)?;

            if !reserved.contains(&token) && !self.storage.token_exists(&token).await? {
                return Ok(token);
            }

            tracing::debug!(attempt, "Token collision, regenerating");
        }

        metrics::counter!("token_space_exhausted_total").increment(1);
        tracing::warn!(attempts = MAX_TOKEN_ATTEMPTS, "No free token found");
        Err(AppError::TokenSpaceExhausted {
            attempts: MAX_TOKEN_ATTEMPTS,
        })
    }

    async fn with_deadline<T>(
        &self,
        operation: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        tokio::time::timeout(self.request_timeout, operation)
            .await
            .map_err(|_| AppError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            })?
    }
}

fn validate_url(raw: &str) -> Result<(), AppError> {
    let parsed = Url::parse(raw).map_err(|e| {
        AppError::bad_request(
            "Invalid URL format",
            json!({ "url": raw, "reason": e.to_string() }),
        )
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::bad_request(
            "Only http and https URLs can be shortened",
            json!({ "url": raw, "scheme": parsed.scheme() }),
        ));
    }

    Ok(())
}
