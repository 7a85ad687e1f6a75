//! # Session Tokens
//!
//! Compact HS256 JWTs (`header.claims.signature`, base64url without padding)
//! carrying a subject id, a session id and the issue/expiry times.
//!
//! [`TokenIssuer::decode`] checks only what the token itself can prove:
//! structure, algorithm, signature and expiry. Whether the subject still
//! exists, and whether its session row is live, is decided by the caller
//! against the user store.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::hmac;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Claims embedded in every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: Uuid,
    /// Session row id.
    pub sid: Uuid,
    /// Login name at issue time. Informational only.
    pub login: String,
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
}

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(&'static str),
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Signs and verifies session tokens with one server-held secret.
#[derive(Clone)]
pub struct TokenIssuer {
    key: hmac::Key,
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl_secs,
            clock,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a token for `sub`/`sid`. Returns the token and its expiry (unix seconds).
    pub fn issue(&self, sub: Uuid, sid: Uuid, login: &str) -> (String, u64) {
        let iat = self.clock.now_secs();
        let claims = SessionClaims {
            sub,
            sid,
            login: login.to_string(),
            iat,
            exp: iat.saturating_add(self.ttl_secs),
        };
        // Serializing a struct of strings and integers cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let tag = hmac::sign(&self.key, signing_input.as_bytes());
        let token = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref()));
        (token, claims.exp)
    }

    /// Verify structure, algorithm, signature and expiry.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed("expected three segments"));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed("header is not base64url"))?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|_| TokenError::Malformed("header is not JSON"))?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::Malformed("signature is not base64url"))?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        hmac::verify(&self.key, signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| TokenError::Malformed("claims are not base64url"))?;
        let claims: SessionClaims = serde_json::from_slice(&claims_bytes)
            .map_err(|_| TokenError::Malformed("claims do not match the session shape"))?;

        if self.clock.now_secs() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
