//! PostgreSQL implementation of URL storage.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::domain::entities::{NewRecord, SaveOutcome, UrlRecord};
use crate::domain::repositories::UrlStorage;
use crate::error::AppError;
use crate::utils::db_error::{ACTIVE_URL_CONSTRAINT, TOKEN_CONSTRAINT, is_unique_violation_on};

/// Connection pool settings for [`PgUrlStorage::connect`].
#[derive(Debug, Clone)]
pub struct PgSettings {
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for PgSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    token: String,
    url: String,
    user_id: String,
    shorted_url: String,
    deleted: bool,
}

impl From<LinkRow> for UrlRecord {
    fn from(row: LinkRow) -> Self {
        Self {
            token: row.token,
            short_url: row.shorted_url,
            original_url: row.url,
            user_id: row.user_id,
            deleted: row.deleted,
        }
    }
}

/// PostgreSQL repository keyed by token.
///
/// Deletes are tombstones (`deleted = TRUE`); rows are never removed. A
/// partial unique index keeps one active row per URL.
pub struct PgUrlStorage {
    pool: PgPool,
}

impl PgUrlStorage {
    /// Wraps an existing pool. Migrations are not applied.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects, verifies the connection, then applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] if the database cannot be reached and
    /// [`AppError::Internal`] if migrations fail. Both are fatal at startup.
    pub async fn connect(dsn: &str, settings: &PgSettings) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(dsn)
            .await
            .map_err(|e| {
                AppError::unavailable(
                    "Failed to connect to database",
                    json!({ "reason": e.to_string() }),
                )
            })?;

        let storage = Self::new(pool);
        storage.ping().await?;
        tracing::info!("Connected to database");

        storage.migrate().await?;
        Ok(storage)
    }

    /// Applies migrations from `./migrations`. A no-op when already current.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                AppError::internal("Failed to migrate", json!({ "reason": e.to_string() }))
            })?;

        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_active_token(&self, url: &str) -> Result<Option<String>, AppError> {
        let token = sqlx::query_scalar::<_, String>(
            "SELECT token FROM shorted_links WHERE url = $1 AND NOT deleted",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    fn token_conflict(token: &str) -> AppError {
        AppError::conflict("Token already in use", json!({ "token": token }))
    }
}

#[async_trait]
impl UrlStorage for PgUrlStorage {
    async fn save(
        &self,
        token: &str,
        url: &str,
        user_id: &str,
        base_url: &str,
    ) -> Result<SaveOutcome, AppError> {
        let result = sqlx::query(
            "INSERT INTO shorted_links (token, url, user_id, shorted_url) VALUES ($1, $2, $3, $4)",
        )
        .bind(token)
        .bind(url)
        .bind(user_id)
        .bind(format!("{base_url}{token}"))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(SaveOutcome::Created(token.to_string())),
            Err(e) if is_unique_violation_on(&e, ACTIVE_URL_CONSTRAINT) => {
                match self.find_active_token(url).await? {
                    Some(existing) => Ok(SaveOutcome::AlreadyExists(existing)),
                    // the conflicting row was deleted between the insert and the lookup
                    None => Err(AppError::conflict(
                        "URL changed concurrently",
                        json!({ "url": url }),
                    )),
                }
            }
            Err(e) if is_unique_violation_on(&e, TOKEN_CONSTRAINT) => {
                Err(Self::token_conflict(token))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_batch(
        &self,
        records: Vec<NewRecord>,
        user_id: &str,
        base_url: &str,
    ) -> Result<Vec<SaveOutcome>, AppError> {
        let mut tx = self.pool.begin().await?;

        for record in &records {
            let result = sqlx::query(
                "INSERT INTO shorted_links (token, url, user_id, shorted_url) VALUES ($1, $2, $3, $4)",
            )
            .bind(&record.token)
            .bind(&record.original_url)
            .bind(user_id)
            .bind(format!("{base_url}{}", record.token))
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(e) if is_unique_violation_on(&e, ACTIVE_URL_CONSTRAINT) => {
                    tx.rollback().await?;
                    return match self.find_active_token(&record.original_url).await? {
                        Some(existing) => {
                            Err(AppError::already_exists(existing, record.original_url.clone()))
                        }
                        // only an earlier row of this batch held the URL
                        None => Err(AppError::conflict(
                            "URL repeated within batch",
                            json!({ "url": record.original_url }),
                        )),
                    };
                }
                Err(e) if is_unique_violation_on(&e, TOKEN_CONSTRAINT) => {
                    tx.rollback().await?;
                    return Err(Self::token_conflict(&record.token));
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(records
            .into_iter()
            .map(|record| SaveOutcome::Created(record.token))
            .collect())
    }

    async fn get(&self, token: &str) -> Result<String, AppError> {
        let row = sqlx::query_as::<_, (String, bool)>(
            "SELECT url, deleted FROM shorted_links WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Err(AppError::not_found(
                "Short link not found",
                json!({ "token": token }),
            )),
            Some((_, true)) => Err(AppError::gone(
                "Short link has been deleted",
                json!({ "token": token }),
            )),
            Some((url, false)) => Ok(url),
        }
    }

    async fn token_exists(&self, token: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM shorted_links WHERE token = $1)",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<UrlRecord>, AppError> {
        let rows = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT token, url, user_id, shorted_url, deleted
            FROM shorted_links
            WHERE user_id = $1 AND NOT deleted
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UrlRecord::from).collect())
    }

    async fn delete_by_tokens(&self, user_id: &str, tokens: &[String]) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE shorted_links
            SET deleted = TRUE
            WHERE user_id = $1 AND token = ANY($2) AND NOT deleted
            "#,
        )
        .bind(user_id)
        .bind(tokens)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::unavailable("Database ping failed", json!({ "reason": e.to_string() }))
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AppError> {
        self.pool.close().await;
        tracing::info!("Database pool closed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn atomic_batches(&self) -> bool {
        true
    }
}
