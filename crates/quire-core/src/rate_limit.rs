//! # Sliding-Window Rate Limiting
//!
//! Per-client request limiting with temporary bans.
//!
//! ## Buckets
//!
//! Each request is classified into one bucket (first match wins):
//!
//! | Bucket     | Match                                   | Max | Window | Ban  |
//! |------------|-----------------------------------------|-----|--------|------|
//! | `auth`     | path contains `/login` or `/register`   | 10  | 60 s   | 30 s |
//! | `write`    | POST, PUT, DELETE, PATCH                | 50  | 60 s   | 30 s |
//! | `read_auth`| GET carrying an `Authorization` header  | 300 | 60 s   | 30 s |
//! | `global`   | anything else                           | 200 | 60 s   | 30 s |
//!
//! Anonymous GETs that land in `global` are not limited at all.
//!
//! ## Algorithm
//!
//! State is kept per `(bucket, client)` as a list of request timestamps plus
//! an optional ban expiry. While banned, requests are rejected and not
//! recorded. Otherwise timestamps that left the window are pruned; a full
//! window starts a ban (and clears the window, so the first request after
//! the ban is evaluated fresh), anything else is recorded and allowed.
//!
//! Stale entries are evicted by an opportunistic sweep that piggybacks on
//! regular checks; there is no background timer.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};

// ── Buckets ─────────────────────────────────────────────────────────────────

/// Request category with its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Auth,
    Write,
    ReadAuth,
    Global,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Write => "write",
            Self::ReadAuth => "read_auth",
            Self::Global => "global",
        }
    }

    /// Classify a request. `None` means the request is not limited.
    pub fn classify(method: &str, path: &str, has_authorization: bool) -> Option<Self> {
        if path.contains("/login") || path.contains("/register") {
            return Some(Self::Auth);
        }
        let method = method.to_ascii_uppercase();
        match method.as_str() {
            "POST" | "PUT" | "DELETE" | "PATCH" => Some(Self::Write),
            "GET" if has_authorization => Some(Self::ReadAuth),
            "GET" => None,
            _ => Some(Self::Global),
        }
    }
}

/// Quota for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
    pub ban_ms: u64,
}

impl BucketPolicy {
    pub const fn new(max_requests: u32, window_ms: u64, ban_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            ban_ms,
        }
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Master switch. Off outside production deployments.
    pub enabled: bool,
    /// Skip limiting when the socket peer is loopback (local tooling, health checkers).
    pub exempt_loopback: bool,
    pub auth: BucketPolicy,
    pub write: BucketPolicy,
    pub read_auth: BucketPolicy,
    pub global: BucketPolicy,
    /// Entries with no timestamp newer than this (and no active ban) are evicted.
    pub stale_after_ms: u64,
    /// Minimum time between two opportunistic sweeps.
    pub sweep_interval_ms: u64,
    /// Sweep immediately once the store holds more entries than this.
    pub sweep_max_entries: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exempt_loopback: true,
            auth: BucketPolicy::new(10, 60_000, 30_000),
            write: BucketPolicy::new(50, 60_000, 30_000),
            read_auth: BucketPolicy::new(300, 60_000, 30_000),
            global: BucketPolicy::new(200, 60_000, 30_000),
            stale_after_ms: 5 * 60_000,
            sweep_interval_ms: 60_000,
            sweep_max_entries: 10_000,
        }
    }
}

impl RateLimiterConfig {
    pub fn policy(&self, bucket: Bucket) -> BucketPolicy {
        match bucket {
            Bucket::Auth => self.auth,
            Bucket::Write => self.write,
            Bucket::ReadAuth => self.read_auth,
            Bucket::Global => self.global,
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Per-client limiter state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Request times (unix ms), oldest first.
    pub timestamps: VecDeque<u64>,
    /// Ban expiry (unix ms).
    pub ban_until: Option<u64>,
}

impl RateLimitEntry {
    fn is_banned(&self, now: u64) -> bool {
        self.ban_until.is_some_and(|until| until > now)
    }

    fn is_stale(&self, now: u64, stale_after_ms: u64) -> bool {
        let horizon = now.saturating_sub(stale_after_ms);
        !self.is_banned(now) && !self.timestamps.iter().any(|&t| t > horizon)
    }
}

/// Storage for limiter entries.
///
/// `with_entry` must run the closure while holding exclusive access to the
/// entry for `key` (creating a default entry if absent), so concurrent
/// requests from one client never interleave their read-modify-write.
pub trait RateLimitStore: Send + Sync + 'static {
    fn with_entry(&self, key: &str, f: &mut dyn FnMut(&mut RateLimitEntry));

    /// Drop every entry for which `keep` returns false. Returns how many went.
    fn retain(&self, keep: &dyn Fn(&RateLimitEntry) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one entry.
    pub fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }
}

impl RateLimitStore for InMemoryStore {
    fn with_entry(&self, key: &str, f: &mut dyn FnMut(&mut RateLimitEntry)) {
        let mut entry = self.entries.entry(key.to_string()).or_default();
        f(entry.value_mut());
    }

    fn retain(&self, keep: &dyn Fn(&RateLimitEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| keep(entry));
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ── Decisions ───────────────────────────────────────────────────────────────

/// What the limiter decided about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Not subject to limiting.
    Bypass,
    /// Recorded and allowed.
    Allowed {
        bucket: Bucket,
        limit: u32,
        remaining: u32,
        /// Unix seconds at which the oldest recorded request leaves the window.
        reset_at_secs: u64,
    },
    /// Rejected; the client is banned.
    Limited {
        bucket: Bucket,
        limit: u32,
        retry_after_secs: u64,
    },
}

impl RateLimitDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }

    /// Client-facing rejection message, for limited decisions.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Limited {
                retry_after_secs, ..
            } => Some(format!(
                "Rate limit exceeded. Try again in {retry_after_secs} seconds."
            )),
            _ => None,
        }
    }

    /// `X-RateLimit-*` headers for allowed decisions.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Allowed {
                limit,
                remaining,
                reset_at_secs,
                ..
            } => vec![
                ("x-ratelimit-limit", limit.to_string()),
                ("x-ratelimit-remaining", remaining.to_string()),
                ("x-ratelimit-reset", reset_at_secs.to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

// ── Request description ─────────────────────────────────────────────────────

/// The parts of a request the limiter looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub has_authorization: bool,
    pub client_id: &'a str,
    /// Address of the socket peer. Proxy headers never feed this.
    pub peer: Option<IpAddr>,
}

/// Resolve the client identifier from proxy headers and the peer address.
///
/// Precedence: `X-Forwarded-For` (first hop) → `X-Real-IP` →
/// `CF-Connecting-IP` → peer address → `"unknown"`.
pub fn client_identifier<'h>(
    header: impl Fn(&str) -> Option<&'h str>,
    peer: Option<IpAddr>,
) -> String {
    let forwarded = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let from_headers = forwarded.or_else(|| {
        ["x-real-ip", "cf-connecting-ip"]
            .into_iter()
            .find_map(|name| header(name).map(str::trim).filter(|v| !v.is_empty()))
    });
    match (from_headers, peer) {
        (Some(id), _) => id.to_string(),
        (None, Some(ip)) => ip.to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Whether `ip` is a loopback address, including IPv4-mapped IPv6.
pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(v6.is_loopback(), |v4| v4.is_loopback()),
    }
}

// ── Limiter ─────────────────────────────────────────────────────────────────

/// Shared, cheaply cloneable rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    last_sweep_ms: Arc<AtomicU64>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .finish()
    }
}

impl RateLimiter {
    /// Limiter over an in-memory store and the system clock.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_parts(config, Arc::new(InMemoryStore::new()), Arc::new(SystemClock))
    }

    /// Limiter over an explicit store and clock.
    pub fn with_parts(
        config: RateLimiterConfig,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            config: Arc::new(config),
            store,
            clock,
            last_sweep_ms: Arc::new(AtomicU64::new(now)),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Number of tracked `(bucket, client)` entries.
    pub fn tracked_entries(&self) -> usize {
        self.store.len()
    }

    /// Decide on one request, recording it when allowed.
    pub fn check(&self, request: &RequestInfo<'_>) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Bypass;
        }
        // Only the socket peer counts; a forwarded header is client-controlled.
        if self.config.exempt_loopback && request.peer.is_some_and(is_loopback) {
            return RateLimitDecision::Bypass;
        }
        let Some(bucket) =
            Bucket::classify(request.method, request.path, request.has_authorization)
        else {
            return RateLimitDecision::Bypass;
        };

        let now = self.clock.now_ms();
        self.maybe_sweep(now);

        let policy = self.config.policy(bucket);
        let key = format!("{}|{}", bucket.as_str(), request.client_id);
        let mut decision = RateLimitDecision::Bypass;
        self.store.with_entry(&key, &mut |entry| {
            decision = evaluate(entry, bucket, policy, now);
        });

        if decision.is_limited() {
            tracing::warn!(
                client = %request.client_id,
                bucket = bucket.as_str(),
                path = %request.path,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Evict stale entries if the sweep interval elapsed or the store grew too large.
    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        let due = now.saturating_sub(last) >= self.config.sweep_interval_ms
            || self.store.len() > self.config.sweep_max_entries;
        if !due {
            return;
        }
        // One sweeper at a time; losers skip.
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.sweep_at(now);
    }

    /// Evict every stale entry as of `now`. Returns the number evicted.
    pub fn sweep_at(&self, now: u64) -> usize {
        let stale_after = self.config.stale_after_ms;
        let evicted = self
            .store
            .retain(&|entry: &RateLimitEntry| !entry.is_stale(now, stale_after));
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.store.len(), "rate limit sweep");
        }
        evicted
    }
}

fn evaluate(
    entry: &mut RateLimitEntry,
    bucket: Bucket,
    policy: BucketPolicy,
    now: u64,
) -> RateLimitDecision {
    if let Some(until) = entry.ban_until {
        if until > now {
            return RateLimitDecision::Limited {
                bucket,
                limit: policy.max_requests,
                retry_after_secs: ceil_secs(until - now),
            };
        }
        entry.ban_until = None;
    }

    let cutoff = now.saturating_sub(policy.window_ms);
    while entry.timestamps.front().is_some_and(|&t| t <= cutoff) {
        entry.timestamps.pop_front();
    }

    if entry.timestamps.len() >= policy.max_requests as usize {
        entry.ban_until = Some(now + policy.ban_ms);
        entry.timestamps.clear();
        return RateLimitDecision::Limited {
            bucket,
            limit: policy.max_requests,
            retry_after_secs: ceil_secs(policy.ban_ms),
        };
    }

    entry.timestamps.push_back(now);
    let used = entry.timestamps.len() as u32;
    let oldest = entry.timestamps.front().copied().unwrap_or(now);
    RateLimitDecision::Allowed {
        bucket,
        limit: policy.max_requests,
        remaining: policy.max_requests.saturating_sub(used),
        reset_at_secs: ceil_secs(oldest + policy.window_ms),
    }
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}
