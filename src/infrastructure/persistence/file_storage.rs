//! JSON-file storage backend.
//!
//! The whole record set is rewritten on every mutation: serialized, written to
//! a uniquely named `<path>.<uuid>.tmp`, then renamed over `<path>`. The rename
//! is the only write to the live path, so a crash mid-write never leaves it
//! truncated. Every write costs O(n); this backend is meant for small,
//! low-traffic deployments.
//!
//! A mutation persists and swaps the in-memory index inside one spawned task
//! that holds the write lock throughout. Dropping the caller's future (a
//! request deadline) cannot separate the two or let the next writer start
//! before the file is settled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::url_index::{IndexEntry, UrlIndex};
use crate::domain::entities::{NewRecord, SaveOutcome, UrlRecord};
use crate::domain::repositories::UrlStorage;
use crate::error::AppError;

/// One record in the storage file.
///
/// `short_url` holds the token. `user_id` and `is_deleted` default when absent
/// so files written without them still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    uuid: String,
    short_url: String,
    original_url: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    is_deleted: bool,
}

/// Storage that keeps the dual map in memory and mirrors it to a JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    index: Arc<RwLock<UrlIndex>>,
}

impl FileStorage {
    /// Opens the storage file, creating an empty one if it does not exist.
    ///
    /// The store is ready only after the file is fully loaded. `base_url` is
    /// used to rebuild short URLs for records read back from disk.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if the file cannot be read, parsed or
    /// created.
    pub async fn open(path: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self, AppError> {
        let path = path.into();
        let base_url = base_url.into();

        let storage = match tokio::fs::read(&path).await {
            Ok(content) => {
                let index = parse_records(&content, &base_url).map_err(|e| {
                    error!(path = %path.display(), error = %e, "Failed to parse storage file");
                    e
                })?;
                info!(path = %path.display(), records = index.len(), "Loaded storage file");
                Self {
                    path,
                    index: Arc::new(RwLock::new(index)),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                persist(&path, &UrlIndex::new()).await?;
                let storage = Self {
                    path,
                    index: Arc::new(RwLock::new(UrlIndex::new())),
                };
                info!(path = %storage.path.display(), "Created empty storage file");
                storage
            }
            Err(e) => return Err(e.into()),
        };

        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `mutate` to a copy of the index, then commits the copy. The
    /// live index is untouched if `mutate` or persisting fails.
    async fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut UrlIndex) -> Result<T, AppError>,
    ) -> Result<T, AppError>
    where
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.index).write_owned().await;
        let mut next = (*guard).clone();
        let out = mutate(&mut next)?;
        self.commit(guard, next, out).await
    }

    /// Persists `next` and swaps it in on a task that runs to completion even
    /// if the caller stops waiting.
    async fn commit<T>(
        &self,
        mut guard: OwnedRwLockWriteGuard<UrlIndex>,
        next: UrlIndex,
        out: T,
    ) -> Result<T, AppError>
    where
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::spawn(async move {
            persist(&path, &next).await?;
            *guard = next;
            Ok::<T, AppError>(out)
        })
        .await
        .map_err(|e| {
            AppError::internal(
                "Storage write task failed",
                json!({ "reason": e.to_string() }),
            )
        })?
    }
}

/// Writes `index` to a fresh temp file beside `path` and renames it over the
/// live file.
async fn persist(path: &Path, index: &UrlIndex) -> Result<(), AppError> {
    let mut records: Vec<FileRecord> = index
        .entries()
        .map(|(token, entry)| FileRecord {
            uuid: entry.uuid.clone(),
            short_url: token.clone(),
            original_url: entry.url.clone(),
            user_id: entry.user_id.clone(),
            is_deleted: entry.deleted,
        })
        .collect();
    records.sort_by(|a, b| a.short_url.cmp(&b.short_url));

    let data = serde_json::to_vec_pretty(&records)?;
    let tmp_path = tmp_path_for(path);

    let written = match tokio::fs::write(&tmp_path, &data).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            warn!(path = %tmp_path.display(), error = %cleanup, "Failed to remove temp file");
        }
        return Err(e.into());
    }

    debug!(path = %path.display(), records = records.len(), "Storage file rewritten");
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.tmp", Uuid::new_v4()));
    PathBuf::from(name)
}

fn parse_records(content: &[u8], base_url: &str) -> Result<UrlIndex, AppError> {
    let mut index = UrlIndex::new();
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(index);
    }

    let records: Vec<FileRecord> = serde_json::from_slice(content)?;
    for record in records {
        let token = record.short_url;
        let entry = IndexEntry {
            uuid: record.uuid,
            short_url: format!("{base_url}{token}"),
            url: record.original_url,
            user_id: record.user_id,
            deleted: record.is_deleted,
        };
        if !index.restore(token.clone(), entry) {
            return Err(AppError::internal(
                "Duplicate token in storage file",
                json!({ "token": token }),
            ));
        }
    }

    Ok(index)
}

#[async_trait]
impl UrlStorage for FileStorage {
    async fn save(
        &self,
        token: &str,
        url: &str,
        user_id: &str,
        base_url: &str,
    ) -> Result<SaveOutcome, AppError> {
        // an already-stored URL changes nothing, so skip the rewrite
        let guard = Arc::clone(&self.index).write_owned().await;
        let mut next = (*guard).clone();
        let outcome = next.insert(token, url, user_id, format!("{base_url}{token}"))?;
        if outcome.already_exists() {
            return Ok(outcome);
        }
        self.commit(guard, next, outcome).await
    }

    async fn save_batch(
        &self,
        records: Vec<NewRecord>,
        user_id: &str,
        base_url: &str,
    ) -> Result<Vec<SaveOutcome>, AppError> {
        self.mutate(|index| {
            records
                .iter()
                .map(|record| {
                    let short_url = format!("{base_url}{}", record.token);
                    index.insert(&record.token, &record.original_url, user_id, short_url)
                })
                .collect()
        })
        .await
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
        self.mutate(|index| Ok(index.tombstone(user_id, tokens))).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), AppError> {
        let index = self.index.read().await;
        persist(&self.path, &index).await?;
        info!(path = %self.path.display(), "Storage file flushed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }

    fn atomic_batches(&self) -> bool {
        false
    }
}
