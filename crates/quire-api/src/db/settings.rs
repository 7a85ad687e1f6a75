//! CMS settings persistence.
//!
//! Values are stored as JSON text in `cms_settings` and surfaced as a
//! single key → value object.

use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::{Sqlite, SqlitePool};

/// Settings seeded on first start.
pub fn defaults() -> Vec<(&'static str, Value)> {
    vec![
        ("site_title", json!("Quire")),
        ("site_description", json!("")),
        ("registration_open", json!(true)),
        ("records_per_page", json!(10)),
    ]
}

#[derive(sqlx::FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

/// All settings as one object.
pub async fn all<'c, E>(db: E) -> Result<Map<String, Value>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, SettingRow>("SELECT key, value FROM cms_settings ORDER BY key")
        .fetch_all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let value = serde_json::from_str(&row.value).unwrap_or_else(|e| {
                tracing::warn!(key = %row.key, error = %e, "setting is not valid JSON, returning raw text");
                Value::String(row.value.clone())
            });
            (row.key, value)
        })
        .collect())
}

/// One setting.
pub async fn get<'c, E>(db: E, key: &str) -> Result<Option<Value>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM cms_settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(raw.and_then(|v| serde_json::from_str(&v).ok()))
}

/// Whether self-registration is open. Missing or malformed means open.
pub async fn registration_open<'c, E>(db: E) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    Ok(get(db, "registration_open")
        .await?
        .and_then(|v| v.as_bool())
        .unwrap_or(true))
}

/// Default page size for record listings.
pub async fn records_per_page<'c, E>(db: E) -> Result<u32, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    Ok(get(db, "records_per_page")
        .await?
        .and_then(|v| v.as_u64())
        .map(|n| n.clamp(1, 100) as u32)
        .unwrap_or(10))
}

/// Insert or replace each pair in one transaction.
pub async fn upsert(pool: &SqlitePool, pairs: &[(String, Value)]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for (key, value) in pairs {
        sqlx::query(
            "INSERT INTO cms_settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}
