//! # quire-core: Request Pipeline Primitives for Quire
//!
//! The framework-agnostic half of the Quire CMS backend. Everything here is
//! plain Rust with no HTTP framework or database dependency, so the HTTP layer
//! (`quire-api`) composes these pieces into middleware and handlers.
//!
//! ## Modules
//!
//! - [`validation`]: declarative field-rule schemas evaluated against flat or
//!   nested JSON payloads, producing an aggregated error list.
//! - [`rate_limit`]: sliding-window rate limiter with request buckets,
//!   temporary bans, and an injectable per-client store.
//! - [`token`]: HS256 session token issuance and verification.
//! - [`clock`]: wall-clock abstraction so time-windowed logic is testable.
//! - [`error`]: the error-kind taxonomy shared by every layer.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.
//! - All time arithmetic is in unix milliseconds obtained from a [`Clock`].

pub mod clock;
pub mod error;
pub mod rate_limit;
pub mod token;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ErrorKind;
pub use rate_limit::{
    client_identifier, is_loopback, Bucket, BucketPolicy, InMemoryStore, RateLimitDecision,
    RateLimitEntry, RateLimitStore, RateLimiter, RateLimiterConfig, RequestInfo,
};
pub use token::{bearer_token, SessionClaims, TokenError, TokenIssuer};
pub use validation::{flatten, validate, Rule, Schema, ValidationReport};
