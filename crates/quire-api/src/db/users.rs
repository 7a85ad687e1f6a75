//! User persistence.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

/// A row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub login: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, login, email, password_hash, display_name, bio, website, is_active, \
                       created_at, updated_at, last_login_at";

/// Fields for a new user.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub login: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
}

/// Profile columns a user may change about themselves. `None` leaves a
/// column untouched; `Some(None)` clears it.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub display_name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub website: Option<Option<String>>,
}

pub async fn insert<'c, E>(db: E, user: &NewUser<'_>, now: DateTime<Utc>) -> Result<Uuid, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, login, email, password_hash, is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(id)
    .bind(user.login)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    Ok(id)
}

pub async fn find_by_id<'c, E>(db: E, id: Uuid) -> Result<Option<UserRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Case-insensitive lookup by login.
pub async fn find_by_login<'c, E>(db: E, login: &str) -> Result<Option<UserRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE login = ?"))
        .bind(login)
        .fetch_optional(db)
        .await
}

/// All users, oldest first.
pub async fn list<'c, E>(db: E) -> Result<Vec<UserRow>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users ORDER BY created_at, login"))
        .fetch_all(db)
        .await
}

pub async fn count<'c, E>(db: E) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(db).await
}

/// Apply profile changes. Returns `false` when the user does not exist.
pub async fn update_profile(
    pool: &SqlitePool,
    id: Uuid,
    changes: &ProfileChanges,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    // COALESCE cannot express "set to NULL", so each column carries a flag.
    let result = sqlx::query(
        "UPDATE users SET
            display_name = CASE WHEN ? THEN ? ELSE display_name END,
            email        = CASE WHEN ? THEN ? ELSE email END,
            bio          = CASE WHEN ? THEN ? ELSE bio END,
            website      = CASE WHEN ? THEN ? ELSE website END,
            updated_at   = ?
         WHERE id = ?",
    )
    .bind(changes.display_name.is_some())
    .bind(changes.display_name.clone().flatten())
    .bind(changes.email.is_some())
    .bind(changes.email.clone().flatten())
    .bind(changes.bio.is_some())
    .bind(changes.bio.clone().flatten())
    .bind(changes.website.is_some())
    .bind(changes.website.clone().flatten())
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Store a new password hash and end the user's session.
pub async fn set_password(
    pool: &SqlitePool,
    id: Uuid,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Activate or deactivate a user. Deactivation ends the user's session.
pub async fn set_active(
    pool: &SqlitePool,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if !active {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn touch_login<'c, E>(db: E, id: Uuid, now: DateTime<Utc>) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

/// Delete a user and everything hanging off it in one transaction.
///
/// Sessions and role memberships are removed; records and invites the user
/// authored are kept with the reference cleared. Returns `false` when the
/// user does not exist.
pub async fn delete_cascade(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE records SET author_id = NULL WHERE author_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE invites SET created_by = NULL WHERE created_by = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE invites SET used_by = NULL WHERE used_by = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        tx.rollback().await?;
        return Ok(false);
    }
    tx.commit().await?;
    Ok(true)
}

/// Result of a registration attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Registration {
    Created { id: Uuid, roles: Vec<String> },
    /// Registration is closed and no invite was presented.
    Closed,
    /// The invite is unknown, expired or already used.
    InvalidInvite,
}

/// Create a user, deciding its initial roles, in one transaction.
///
/// The first user ever becomes `admin`. Later users need an open
/// registration setting or a redeemable invite; an invite grants its role.
pub async fn register(
    pool: &SqlitePool,
    user: &NewUser<'_>,
    invite_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Registration, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let first_user = count(&mut *tx).await? == 0;
    let mut grant: Option<String> = first_user.then(|| "admin".to_string());
    let mut redeem: Option<&str> = None;

    if !first_user {
        match invite_code {
            Some(code) => match super::invites::find(&mut *tx, code).await? {
                Some(invite) if invite.is_redeemable(now) => {
                    grant = Some(invite.role);
                    redeem = Some(code);
                }
                _ => {
                    tx.rollback().await?;
                    return Ok(Registration::InvalidInvite);
                }
            },
            None if !super::settings::registration_open(&mut *tx).await? => {
                tx.rollback().await?;
                return Ok(Registration::Closed);
            }
            None => {}
        }
    }

    let id = insert(&mut *tx, user, now).await?;
    if let Some(role) = &grant {
        super::roles::grant(&mut tx, id, role).await?;
    }
    if let Some(code) = redeem {
        if !super::invites::redeem(&mut tx, code, id, now).await? {
            tx.rollback().await?;
            return Ok(Registration::InvalidInvite);
        }
    }
    let roles = super::roles::for_user(&mut *tx, id).await?;

    tx.commit().await?;
    if first_user {
        tracing::info!(user_id = %id, "first user registered and granted admin");
    }
    Ok(Registration::Created { id, roles })
}
