//! Registration invites.
//!
//! An invite is a random code bound to a role. It is valid until it expires
//! or is redeemed, whichever comes first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema, sqlx::FromRow)]
pub struct InviteRow {
    pub code: String,
    pub role: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_by: Option<Uuid>,
    pub used_at: Option<DateTime<Utc>>,
}

impl InviteRow {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.used_by.is_none() && self.used_at.is_none() && self.expires_at > now
    }
}

const COLUMNS: &str = "code, role, created_by, created_at, expires_at, used_by, used_at";

/// 32 lowercase hex characters.
pub fn generate_code() -> String {
    Uuid::new_v4().simple().to_string()
}

pub async fn insert<'c, E>(
    db: E,
    role: &str,
    created_by: Uuid,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<InviteRow, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let invite = InviteRow {
        code: generate_code(),
        role: role.to_string(),
        created_by: Some(created_by),
        created_at: now,
        expires_at,
        used_by: None,
        used_at: None,
    };
    sqlx::query(
        "INSERT INTO invites (code, role, created_by, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&invite.code)
    .bind(&invite.role)
    .bind(invite.created_by)
    .bind(invite.created_at)
    .bind(invite.expires_at)
    .execute(db)
    .await?;
    Ok(invite)
}

pub async fn list<'c, E>(db: E) -> Result<Vec<InviteRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, InviteRow>(&format!("SELECT {COLUMNS} FROM invites ORDER BY created_at DESC"))
        .fetch_all(db)
        .await
}

pub async fn find<'c, E>(db: E, code: &str) -> Result<Option<InviteRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, InviteRow>(&format!("SELECT {COLUMNS} FROM invites WHERE code = ?"))
        .bind(code)
        .fetch_optional(db)
        .await
}

/// Mark an invite as redeemed. Returns `false` if it was already used.
pub async fn redeem(
    conn: &mut SqliteConnection,
    code: &str,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE invites SET used_by = ?, used_at = ? WHERE code = ? AND used_at IS NULL",
    )
    .bind(user_id)
    .bind(now)
    .bind(code)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete<'c, E>(db: E, code: &str) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM invites WHERE code = ?")
        .bind(code)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
