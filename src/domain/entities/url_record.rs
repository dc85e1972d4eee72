//! URL record entity and the values exchanged when saving records.

use serde::{Deserialize, Serialize};

/// A persisted mapping between a short token and the original URL.
///
/// `token` is immutable once assigned and never reused, even after the record
/// is tombstoned. `short_url` is derived from the service base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    #[serde(skip)]
    pub token: String,
    pub short_url: String,
    pub original_url: String,
    #[serde(skip)]
    pub user_id: String,
    #[serde(skip)]
    pub deleted: bool,
}

impl UrlRecord {
    /// Creates a new active record.
    pub fn new(
        token: impl Into<String>,
        original_url: impl Into<String>,
        user_id: impl Into<String>,
        short_url: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            short_url: short_url.into(),
            original_url: original_url.into(),
            user_id: user_id.into(),
            deleted: false,
        }
    }

    /// Returns true if the record has been tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A `(token, url)` pair handed to `save_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub token: String,
    pub original_url: String,
}

impl NewRecord {
    pub fn new(token: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            original_url: original_url.into(),
        }
    }
}

/// One entry of a batch shortening request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchItem {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

/// Result of shortening one [`BatchItem`], keyed by the caller's correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_url: String,
}

/// Outcome of an idempotent save.
///
/// An already-stored URL is not an error: the caller gets the existing token
/// and decides how to report it (typically `409 Conflict` with the short URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created(String),
    AlreadyExists(String),
}

impl SaveOutcome {
    /// The effective token: the new one, or the one already bound to the URL.
    pub fn token(&self) -> &str {
        match self {
            Self::Created(token) | Self::AlreadyExists(token) => token,
        }
    }

    pub fn into_token(self) -> String {
        match self {
            Self::Created(token) | Self::AlreadyExists(token) => token,
        }
    }

    pub fn already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let record = UrlRecord::new("abc", "https://example.com", "u1", "http://s/abc");

        assert_eq!(record.token, "abc");
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.short_url, "http://s/abc");
        assert!(!record.is_deleted());
    }

    #[test]
    fn test_record_serializes_public_fields_only() {
        let record = UrlRecord::new("abc", "https://example.com", "u1", "http://s/abc");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["short_url"], "http://s/abc");
        assert_eq!(json["original_url"], "https://example.com");
        assert!(json.get("user_id").is_none());
        assert!(json.get("deleted").is_none());
    }

    #[test]
    fn test_save_outcome_token() {
        let created = SaveOutcome::Created("t1".to_string());
        let existing = SaveOutcome::AlreadyExists("t0".to_string());

        assert_eq!(created.token(), "t1");
        assert!(!created.already_exists());
        assert_eq!(existing.token(), "t0");
        assert!(existing.already_exists());
        assert_eq!(existing.into_token(), "t0");
    }
}
