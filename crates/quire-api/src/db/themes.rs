//! Theme persistence. Exactly one theme is active once bootstrap has run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema, sqlx::FromRow)]
pub struct ThemeRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a delete attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Active,
}

pub async fn list<'c, E>(db: E) -> Result<Vec<ThemeRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ThemeRow>(
        "SELECT id, name, description, is_active, created_at FROM themes ORDER BY name",
    )
    .fetch_all(db)
    .await
}

pub async fn active<'c, E>(db: E) -> Result<Option<ThemeRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ThemeRow>(
        "SELECT id, name, description, is_active, created_at FROM themes WHERE is_active = 1",
    )
    .fetch_optional(db)
    .await
}

pub async fn get<'c, E>(db: E, id: Uuid) -> Result<Option<ThemeRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ThemeRow>(
        "SELECT id, name, description, is_active, created_at FROM themes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Insert an inactive theme.
pub async fn insert(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ThemeRow, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO themes (id, name, description, is_active, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(now)
    .execute(pool)
    .await?;
    get(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Make `id` the only active theme. Returns `None` if it does not exist.
pub async fn activate(pool: &SqlitePool, id: Uuid) -> Result<Option<ThemeRow>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    if get(&mut *tx, id).await?.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }
    sqlx::query("UPDATE themes SET is_active = 0 WHERE is_active = 1 AND id <> ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE themes SET is_active = 1 WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let theme = get(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(theme)
}

/// Delete an inactive theme.
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<DeleteOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let outcome = match get(&mut *tx, id).await? {
        None => DeleteOutcome::NotFound,
        Some(theme) if theme.is_active => DeleteOutcome::Active,
        Some(_) => {
            sqlx::query("DELETE FROM themes WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            DeleteOutcome::Deleted
        }
    };
    tx.commit().await?;
    Ok(outcome)
}
