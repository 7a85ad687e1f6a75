//! Record (article) persistence.
//!
//! Visibility is decided by the caller; queries only filter on
//! `is_published` when asked to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

/// A row of the `records` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub author_id: Option<Uuid>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, title, slug, excerpt, content, author_id, is_published, published_at, \
                       created_at, updated_at";

#[derive(Debug)]
pub struct NewRecord {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub author_id: Uuid,
    pub is_published: bool,
}

/// Column changes for an update. `None` leaves a column untouched.
#[derive(Debug, Default)]
pub struct RecordChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<Option<String>>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
}

pub async fn insert(pool: &SqlitePool, record: &NewRecord, now: DateTime<Utc>) -> Result<RecordRow, sqlx::Error> {
    let id = Uuid::new_v4();
    let published_at = record.is_published.then_some(now);
    sqlx::query(
        "INSERT INTO records
            (id, title, slug, excerpt, content, author_id, is_published, published_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&record.title)
    .bind(&record.slug)
    .bind(&record.excerpt)
    .bind(&record.content)
    .bind(record.author_id)
    .bind(record.is_published)
    .bind(published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    get(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn get<'c, E>(db: E, id: Uuid) -> Result<Option<RecordRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, RecordRow>(&format!("SELECT {COLUMNS} FROM records WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

/// One page of records, newest first, plus the total matching count.
pub async fn page(
    pool: &SqlitePool,
    include_drafts: bool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<RecordRow>, i64), sqlx::Error> {
    // `?1 = 1` short-circuits the published filter for privileged callers.
    let rows = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {COLUMNS} FROM records
         WHERE ?1 = 1 OR is_published = 1
         ORDER BY created_at DESC, id
         LIMIT ?2 OFFSET ?3"
    ))
    .bind(include_drafts)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE ?1 = 1 OR is_published = 1")
            .bind(include_drafts)
            .fetch_one(pool)
            .await?;
    Ok((rows, total))
}

/// Apply changes. Returns the updated row, or `None` if the record is gone.
pub async fn update(
    pool: &SqlitePool,
    id: Uuid,
    changes: &RecordChanges,
    now: DateTime<Utc>,
) -> Result<Option<RecordRow>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE records SET
            title        = COALESCE(?, title),
            slug         = COALESCE(?, slug),
            excerpt      = CASE WHEN ? THEN ? ELSE excerpt END,
            content      = COALESCE(?, content),
            published_at = CASE
                               WHEN ? IS NULL THEN published_at
                               WHEN ? = 1 AND is_published = 0 THEN ?
                               WHEN ? = 0 THEN NULL
                               ELSE published_at
                           END,
            is_published = COALESCE(?, is_published),
            updated_at   = ?
         WHERE id = ?",
    )
    .bind(&changes.title)
    .bind(&changes.slug)
    .bind(changes.excerpt.is_some())
    .bind(changes.excerpt.clone().flatten())
    .bind(&changes.content)
    .bind(changes.is_published)
    .bind(changes.is_published)
    .bind(now)
    .bind(changes.is_published)
    .bind(changes.is_published)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get(pool, id).await
}

/// Set publication state. Returns the updated row, or `None` if the record is gone.
pub async fn set_published(
    pool: &SqlitePool,
    id: Uuid,
    published: bool,
    now: DateTime<Utc>,
) -> Result<Option<RecordRow>, sqlx::Error> {
    let changes = RecordChanges {
        is_published: Some(published),
        ..RecordChanges::default()
    };
    update(pool, id, &changes, now).await
}

pub async fn delete<'c, E>(db: E, id: Uuid) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM records WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
