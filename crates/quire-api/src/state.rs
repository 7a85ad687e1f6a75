//! # Application State
//!
//! Shared state for the Axum application: the database pool, the parsed
//! configuration and the request-pipeline services built from it.
//!
//! Every field is cheap to clone (a pool handle or an `Arc`), so axum clones
//! the whole state into each handler.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use quire_core::{Clock, RateLimiter, SystemClock, TokenIssuer};
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::password::DecoyHash;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub tokens: TokenIssuer,
    pub limiter: RateLimiter,
    pub metrics: ApiMetrics,
    pub decoy_hash: DecoyHash,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// State backed by the system clock.
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self::with_clock(pool, config, Arc::new(SystemClock))
    }

    /// State driven by `clock`. Tokens, sessions and the rate limiter all
    /// read time from it.
    pub fn with_clock(pool: SqlitePool, config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let tokens = TokenIssuer::new(
            config.jwt_secret.expose(),
            config.token_ttl_secs,
            Arc::clone(&clock),
        );
        let limiter = RateLimiter::with_parts(
            config.rate_limit.clone(),
            Arc::new(quire_core::InMemoryStore::new()),
            Arc::clone(&clock),
        );
        Self {
            pool,
            config: Arc::new(config),
            tokens,
            limiter,
            metrics: ApiMetrics::new(),
            decoy_hash: DecoyHash::new(),
            clock,
        }
    }

    /// Current time according to the state's clock.
    pub fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.clock.now_ms() as i64)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .field("tracked_clients", &self.limiter.tracked_entries())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
