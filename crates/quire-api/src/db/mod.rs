//! # Database Persistence Layer
//!
//! SQLite persistence for every Quire entity via SQLx.
//!
//! ## Conventions
//!
//! - Single-statement functions are generic over [`sqlx::Executor`] so the
//!   same query runs against the pool or inside an open transaction.
//! - Multi-statement operations take the pool and own their transaction;
//!   a failure anywhere rolls the whole sequence back.
//! - Queries are plain runtime SQL mapped through `FromRow` row types.
//!
//! ## Bootstrap
//!
//! After migrations, one transaction seeds the role table, the default
//! settings and the default theme. Seeding is idempotent.

pub mod invites;
pub mod records;
pub mod roles;
pub mod sessions;
pub mod settings;
pub mod themes;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

/// Built-in roles and their descriptions.
pub const DEFAULT_ROLES: &[(&str, &str)] = &[
    ("admin", "Full access, including users, themes and settings"),
    ("editor", "Edit and publish any record"),
    ("author", "Write and edit own records"),
];

/// Name of the theme created on first start.
pub const DEFAULT_THEME: &str = "default";

/// Open the database at `url`, apply migrations and seed defaults.
///
/// `sqlite::memory:` URLs get a single never-recycled connection, since
/// every SQLite connection to `:memory:` is its own database.
pub async fn init_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await?
    };
    tracing::info!(in_memory, "connected to SQLite");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    bootstrap(&pool).await?;
    Ok(pool)
}

/// Seed roles, default settings and the default theme.
pub async fn bootstrap(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    for (name, description) in DEFAULT_ROLES {
        sqlx::query("INSERT OR IGNORE INTO roles (name, description) VALUES (?, ?)")
            .bind(name)
            .bind(description)
            .execute(&mut *tx)
            .await?;
    }

    for (key, value) in settings::defaults() {
        sqlx::query("INSERT OR IGNORE INTO cms_settings (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    let themes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM themes")
        .fetch_one(&mut *tx)
        .await?;
    if themes == 0 {
        sqlx::query(
            "INSERT INTO themes (id, name, description, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(DEFAULT_THEME)
        .bind("Built-in theme")
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::debug!("bootstrap data seeded");
    Ok(())
}
