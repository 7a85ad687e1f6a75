//! Session rows.
//!
//! `sessions.user_id` is unique: a user has at most one live session.
//! Login swaps the row atomically; logout, password change, deactivation and
//! deletion remove it.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Replace any session of `user_id` with a fresh one, and stamp the login.
///
/// Returns the new session id.
pub async fn replace_for_user(
    pool: &SqlitePool,
    user_id: Uuid,
    client: Option<&str>,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    let replaced = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, client, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(user_id)
    .bind(client)
    .bind(now)
    .bind(expires_at)
    .execute(&mut *tx)
    .await?;
    super::users::touch_login(&mut *tx, user_id, now).await?;

    tx.commit().await?;
    if replaced > 0 {
        tracing::info!(user_id = %user_id, "previous session replaced by new login");
    }
    Ok(id)
}

pub async fn find<'c, E>(db: E, id: Uuid) -> Result<Option<SessionRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, SessionRow>(
        "SELECT id, user_id, client, created_at, expires_at FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn for_user<'c, E>(db: E, user_id: Uuid) -> Result<Option<SessionRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, SessionRow>(
        "SELECT id, user_id, client, created_at, expires_at FROM sessions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// Delete one session. Returns whether a row was removed.
pub async fn delete<'c, E>(db: E, id: Uuid) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove sessions past their expiry. Returns the number removed.
pub async fn purge_expired<'c, E>(db: E, now: DateTime<Utc>) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
