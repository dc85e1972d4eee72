//! In-memory storage backend.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::url_index::UrlIndex;
use crate::domain::entities::{NewRecord, SaveOutcome, UrlRecord};
use crate::domain::repositories::UrlStorage;
use crate::error::AppError;

/// Process-lifetime storage backed by a token/URL dual map.
///
/// Writers take the lock exclusively, so a reader never sees one direction of
/// the mapping without the other.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    index: RwLock<UrlIndex>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UrlStorage for MemoryStorage {
    async fn save(
        &self,
        token: &str,
        url: &str,
        user_id: &str,
        base_url: &str,
    ) -> Result<SaveOutcome, AppError> {
        self.index
            .write()
            .await
            .insert(token, url, user_id, format!("{base_url}{token}"))
    }

    async fn save_batch(
        &self,
        records: Vec<NewRecord>,
        user_id: &str,
        base_url: &str,
    ) -> Result<Vec<SaveOutcome>, AppError> {
        let mut index = self.index.write().await;
        records
            .iter()
            .map(|record| {
                let short_url = format!("{base_url}{}", record.token);
                index.insert(&record.token, &record.original_url, user_id, short_url)
            })
            .collect()
    }

    async fn get(&self, token: &str) -> Result<String, AppError> {
        self.index.read().await.get(token)
    }

    async fn token_exists(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.index.read().await.contains_token(token))
    }

    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<UrlRecord>, AppError> {
        Ok(self.index.read().await.records_for(user_id))
    }

    async fn delete_by_tokens(&self, user_id: &str, tokens: &[String]) -> Result<u64, AppError> {
        Ok(self.index.write().await.tombstone(user_id, tokens))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn atomic_batches(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://s/";

    #[tokio::test]
    async fn test_save_and_get() {
        let storage = MemoryStorage::new();

        let outcome = storage
            .save("t1", "https://a.example/", "u1", BASE)
            .await
            .unwrap();

        assert_eq!(outcome, SaveOutcome::Created("t1".to_string()));
        assert_eq!(storage.get("t1").await.unwrap(), "https://a.example/");
    }

    #[tokio::test]
    async fn test_save_is_idempotent_per_url() {
        let storage = MemoryStorage::new();
        storage
            .save("t1", "https://a.example/", "u1", BASE)
            .await
            .unwrap();

        let outcome = storage
            .save("t2", "https://a.example/", "u1", BASE)
            .await
            .unwrap();

        assert_eq!(outcome, SaveOutcome::AlreadyExists("t1".to_string()));
        assert!(!storage.token_exists("t2").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_batch_skips_duplicate_urls() {
        let storage = MemoryStorage::new();
        let records = vec![
            NewRecord::new("t1", "https://a.example/"),
            NewRecord::new("t2", "https://a.example/"),
            NewRecord::new("t3", "https://b.example/"),
        ];

        let outcomes = storage.save_batch(records, "u1", BASE).await.unwrap();

        assert_eq!(
            outcomes,
            vec![
                SaveOutcome::Created("t1".to_string()),
                SaveOutcome::AlreadyExists("t1".to_string()),
                SaveOutcome::Created("t3".to_string()),
            ]
        );
        let stored = storage.get_all_for_user("u1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(!storage.token_exists("t2").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_for_user_builds_short_urls() {
        let storage = MemoryStorage::new();
        storage
            .save("t1", "https://a.example/", "u1", BASE)
            .await
            .unwrap();

        let records = storage.get_all_for_user("u1").await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].short_url, "http://s/t1");
        assert!(storage.get_all_for_user("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_marks_gone() {
        let storage = MemoryStorage::new();
        storage
            .save("t1", "https://a.example/", "u1", BASE)
            .await
            .unwrap();

        let deleted = storage
            .delete_by_tokens("u1", &["t1".to_string()])
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(matches!(storage.get("t1").await, Err(AppError::Gone { .. })));
        assert!(storage.token_exists("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_ping_and_close_are_noops() {
        let storage = MemoryStorage::new();
        assert!(storage.ping().await.is_ok());
        assert!(storage.close().await.is_ok());
        assert_eq!(storage.backend_name(), "memory");
        assert!(!storage.atomic_batches());
    }
}
