//! Dual-map index shared by the memory and file backends.
//!
//! `by_token` holds every record ever stored, tombstones included, so a token
//! is never reused. `by_url` holds only active records and backs the
//! uniqueness check. Both maps change together through the methods below;
//! the raw maps are never exposed.

use std::collections::HashMap;

use serde_json::json;
use uuid::Uuid;

use crate::domain::entities::{SaveOutcome, UrlRecord};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub uuid: String,
    pub url: String,
    pub user_id: String,
    pub short_url: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct UrlIndex {
    by_token: HashMap<String, IndexEntry>,
    by_url: HashMap<String, String>,
}

impl UrlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new active record unless the URL is already stored.
    pub fn insert(
        &mut self,
        token: &str,
        url: &str,
        user_id: &str,
        short_url: String,
    ) -> Result<SaveOutcome, AppError> {
        if let Some(existing) = self.by_url.get(url) {
            return Ok(SaveOutcome::AlreadyExists(existing.clone()));
        }

        if token.is_empty() {
            return Err(AppError::bad_request("Token must not be empty", json!({})));
        }

        if self.by_token.contains_key(token) {
            return Err(AppError::conflict(
                "Token already in use",
                json!({ "token": token }),
            ));
        }

        self.by_token.insert(
            token.to_string(),
            IndexEntry {
                uuid: Uuid::new_v4().to_string(),
                url: url.to_string(),
                user_id: user_id.to_string(),
                short_url,
                deleted: false,
            },
        );
        self.by_url.insert(url.to_string(), token.to_string());

        Ok(SaveOutcome::Created(token.to_string()))
    }

    /// Puts back an entry read from durable storage.
    ///
    /// Returns false and skips the entry if its token is already present.
    /// An active entry whose URL is already indexed is kept as a tombstone.
    pub fn restore(&mut self, token: String, mut entry: IndexEntry) -> bool {
        if self.by_token.contains_key(&token) {
            return false;
        }

        if !entry.deleted {
            if self.by_url.contains_key(&entry.url) {
                entry.deleted = true;
            } else {
                self.by_url.insert(entry.url.clone(), token.clone());
            }
        }

        self.by_token.insert(token, entry);
        true
    }

    pub fn get(&self, token: &str) -> Result<String, AppError> {
        match self.by_token.get(token) {
            None => Err(AppError::not_found(
                "Short link not found",
                json!({ "token": token }),
            )),
            Some(entry) if entry.deleted => Err(AppError::gone(
                "Short link has been deleted",
                json!({ "token": token }),
            )),
            Some(entry) => Ok(entry.url.clone()),
        }
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.by_token.contains_key(token)
    }

    pub fn records_for(&self, user_id: &str) -> Vec<UrlRecord> {
        self.by_token
            .iter()
            .filter(|(_, entry)| !entry.deleted && entry.user_id == user_id)
            .map(|(token, entry)| {
                UrlRecord::new(
                    token.clone(),
                    entry.url.clone(),
                    entry.user_id.clone(),
                    entry.short_url.clone(),
                )
            })
            .collect()
    }

    /// Tombstones the active records in `tokens` owned by `user_id`.
    pub fn tombstone(&mut self, user_id: &str, tokens: &[String]) -> u64 {
        let mut deleted = 0;

        for token in tokens {
            let Some(entry) = self.by_token.get_mut(token) else {
                continue;
            };
            if entry.deleted || entry.user_id != user_id {
                continue;
            }

            entry.deleted = true;
            if self.by_url.get(&entry.url) == Some(token) {
                self.by_url.remove(&entry.url);
            }
            deleted += 1;
        }

        deleted
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &IndexEntry)> {
        self.by_token.iter()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }
}
