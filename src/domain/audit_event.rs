//! Audit event model for write and redirect notifications.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What happened to a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// A new short URL was created.
    Shorten,
    /// A short URL was resolved for a redirect.
    Follow,
}

/// An audit notification fanned out to subscribers.
///
/// Delivery is at-most-once and best-effort: the publisher neither retries
/// nor persists events, so this is not a durable audit log.
///
/// Serialized as `{"ts": <unix seconds>, "action": "shorten", "user_id": "...", "url": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: i64,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub url: String,
}

impl AuditEvent {
    /// Creates an event stamped with the current time.
    ///
    /// An empty `user_id` means the caller is anonymous and is omitted.
    pub fn new(action: AuditAction, user_id: &str, url: impl Into<String>) -> Self {
        Self {
            ts: Utc::now().timestamp(),
            action,
            user_id: (!user_id.is_empty()).then(|| user_id.to_string()),
            url: url.into(),
        }
    }
}
