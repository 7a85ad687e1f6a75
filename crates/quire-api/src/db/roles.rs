//! Role membership.
//!
//! Roles live in `roles`; membership in `user_roles`. A user's role set is
//! always read from these rows, never from the session token.

use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Role names held by `user_id`, sorted.
pub async fn for_user<'c, E>(db: E, user_id: Uuid) -> Result<Vec<String>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(
        "SELECT r.name FROM roles r
         JOIN user_roles ur ON ur.role_id = r.id
         WHERE ur.user_id = ?
         ORDER BY r.name",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

/// Grant `role` to `user_id`. Granting a held role is a no-op.
///
/// Returns `false` when no role of that name exists.
pub async fn grant(conn: &mut SqliteConnection, user_id: Uuid, role: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO user_roles (user_id, role_id)
         SELECT ?, id FROM roles WHERE name = ?",
    )
    .bind(user_id)
    .bind(role)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() > 0 {
        return Ok(true);
    }
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE name = ?")
        .bind(role)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists > 0)
}

/// Outcome of [`replace`].
#[derive(Debug, PartialEq, Eq)]
pub enum Replaced {
    /// The new role set, sorted.
    Granted(Vec<String>),
    /// No role of this name exists. Nothing was changed.
    UnknownRole(String),
}

/// Replace the role set of `user_id` in one transaction.
pub async fn replace(pool: &SqlitePool, user_id: Uuid, roles: &[String]) -> Result<Replaced, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for role in roles {
        if !grant(&mut tx, user_id, role).await? {
            tx.rollback().await?;
            return Ok(Replaced::UnknownRole(role.clone()));
        }
    }
    let granted = for_user(&mut *tx, user_id).await?;
    tx.commit().await?;
    Ok(Replaced::Granted(granted))
}

/// Number of users holding `role`.
pub async fn holders<'c, E>(db: E, role: &str) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_roles ur JOIN roles r ON r.id = ur.role_id WHERE r.name = ?",
    )
    .bind(role)
    .fetch_one(db)
    .await
}
