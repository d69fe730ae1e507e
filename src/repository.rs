use crate::models::{Advertisement, AdvertisementChanges, NewAdvertisement};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{PgPool, error::ErrorKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// RepositoryError
///
/// Failure modes of the persistence layer. `Conflict` carries the raw storage
/// message for logging only; the HTTP layer never echoes it to clients.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("advertisement {0} not found")]
    NotFound(i64),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("integrity violation: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Repository Trait
///
/// The abstract contract for advertisement persistence. Handlers only see
/// `Arc<dyn Repository>`, so the Postgres store and the in-memory store (or a
/// test double) are interchangeable.
///
/// Every operation either fully applies or has no effect.
#[async_trait]
pub trait Repository: Send + Sync {
    // Validates, assigns a fresh id and stamps the current time.
    async fn create_advertisement(&self, new: NewAdvertisement) -> Result<Advertisement, RepositoryError>;

    async fn get_advertisement(&self, id: i64) -> Result<Advertisement, RepositoryError>;

    // All rows in creation order. An empty table is `Ok(vec![])`.
    async fn list_advertisements(&self) -> Result<Vec<Advertisement>, RepositoryError>;

    // Partial update under a row lock. Always refreshes the timestamp.
    async fn update_advertisement(
        &self,
        id: i64,
        changes: AdvertisementChanges,
    ) -> Result<Advertisement, RepositoryError>;

    // Returns the row as it was immediately before removal.
    async fn delete_advertisement(&self, id: i64) -> Result<Advertisement, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Maps integrity-constraint failures on insert to `Conflict`, everything else to `Storage`.
fn classify_write_error(e: sqlx::Error) -> RepositoryError {
    let kind = e.as_database_error().map(|db| db.kind());
    match kind {
        Some(
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation,
        ) => RepositoryError::Conflict(e.to_string()),
        _ => RepositoryError::Storage(e),
    }
}

/// PostgresRepository
///
/// The durable implementation backed by the `advertisements` table.
/// Ids come from an identity sequence, so they are never handed out twice.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations under `./migrations`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_advertisement(&self, new: NewAdvertisement) -> Result<Advertisement, RepositoryError> {
        new.validate().map_err(RepositoryError::Validation)?;

        sqlx::query_as::<_, Advertisement>(
            r#"INSERT INTO advertisements (title, description, created_or_updated_at, creator)
               VALUES ($1, $2, clock_timestamp(), $3)
               RETURNING id, title, description, created_or_updated_at, creator"#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.creator)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_write_error)
    }

    async fn get_advertisement(&self, id: i64) -> Result<Advertisement, RepositoryError> {
        sqlx::query_as::<_, Advertisement>(
            r#"SELECT id, title, description, created_or_updated_at, creator
               FROM advertisements
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound(id))
    }

    async fn list_advertisements(&self) -> Result<Vec<Advertisement>, RepositoryError> {
        let rows = sqlx::query_as::<_, Advertisement>(
            r#"SELECT id, title, description, created_or_updated_at, creator
               FROM advertisements
               ORDER BY id ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// update_advertisement
    ///
    /// Locks the row with `FOR UPDATE`, merges the changes over the values read
    /// under that lock, then writes. A concurrent update waits for the lock and
    /// merges over the committed result; a concurrent delete makes this return
    /// `NotFound`. Dropping the transaction before `commit` rolls it back.
    async fn update_advertisement(
        &self,
        id: i64,
        changes: AdvertisementChanges,
    ) -> Result<Advertisement, RepositoryError> {
        changes.validate().map_err(RepositoryError::Validation)?;

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Advertisement>(
            r#"SELECT id, title, description, created_or_updated_at, creator
               FROM advertisements
               WHERE id = $1
               FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound(id))?;

        let title = changes.title.unwrap_or(current.title);
        let description = changes.description.unwrap_or(current.description);

        // GREATEST keeps the stamp strictly increasing even if the clock stalls.
        let updated = sqlx::query_as::<_, Advertisement>(
            r#"UPDATE advertisements
               SET title = $2,
                   description = $3,
                   created_or_updated_at = GREATEST(
                       clock_timestamp(),
                       $4::timestamptz + INTERVAL '1 microsecond'
                   )
               WHERE id = $1
               RETURNING id, title, description, created_or_updated_at, creator"#,
        )
        .bind(id)
        .bind(&title)
        .bind(&description)
        .bind(current.created_or_updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_advertisement(&self, id: i64) -> Result<Advertisement, RepositoryError> {
        sqlx::query_as::<_, Advertisement>(
            r#"DELETE FROM advertisements
               WHERE id = $1
               RETURNING id, title, description, created_or_updated_at, creator"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound(id))
    }
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct MemoryTable {
    last_id: i64,
    // BTreeMap keyed by a monotonic id iterates in creation order.
    rows: BTreeMap<i64, Advertisement>,
}

/// InMemoryRepository
///
/// A process-local store with the same semantics as `PostgresRepository`.
/// One `RwLock` guards the table and the id counter; every mutation holds the
/// write lock across its read-modify-write, which makes each operation
/// linearizable. Not durable: contents are lost when the process exits.
#[derive(Default)]
pub struct InMemoryRepository {
    table: RwLock<MemoryTable>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Current time, bumped past `previous` when the clock has not moved on.
fn next_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev => prev + TimeDelta::microseconds(1),
        _ => now,
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_advertisement(&self, new: NewAdvertisement) -> Result<Advertisement, RepositoryError> {
        new.validate().map_err(RepositoryError::Validation)?;

        let mut table = self.table.write().await;
        table.last_id += 1;
        let advertisement = Advertisement {
            id: table.last_id,
            title: new.title,
            description: new.description,
            created_or_updated_at: next_stamp(None),
            creator: new.creator,
        };
        table.rows.insert(advertisement.id, advertisement.clone());
        Ok(advertisement)
    }

    async fn get_advertisement(&self, id: i64) -> Result<Advertisement, RepositoryError> {
        self.table
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn list_advertisements(&self) -> Result<Vec<Advertisement>, RepositoryError> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn update_advertisement(
        &self,
        id: i64,
        changes: AdvertisementChanges,
    ) -> Result<Advertisement, RepositoryError> {
        changes.validate().map_err(RepositoryError::Validation)?;

        let mut table = self.table.write().await;
        let row = table.rows.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        if let Some(title) = changes.title {
            row.title = title;
        }
        if let Some(description) = changes.description {
            row.description = description;
        }
        row.created_or_updated_at = next_stamp(Some(row.created_or_updated_at));
        Ok(row.clone())
    }

    async fn delete_advertisement(&self, id: i64) -> Result<Advertisement, RepositoryError> {
        self.table
            .write()
            .await
            .rows
            .remove(&id)
            .ok_or(RepositoryError::NotFound(id))
    }
}
