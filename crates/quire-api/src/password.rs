//! Argon2id password hashing.
//!
//! Hashing is CPU-bound, so both operations run on the blocking pool.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::PasswordParams;
use crate::error::AppError;

fn hasher(params: PasswordParams) -> Result<Argon2<'static>, AppError> {
    let params = Params::new(params.memory_kib, params.iterations, 1, None)
        .map_err(|e| AppError::Internal(format!("invalid argon2 parameters: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash `password` into a PHC string.
pub async fn hash(params: PasswordParams, password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        hasher(params)?
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
}

/// Check `password` against a stored PHC string.
///
/// The cost parameters are read from the stored hash.
pub async fn verify(password: String, stored: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored)
            .map_err(|e| AppError::Internal(format!("stored password hash is invalid: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))?
}

/// Throwaway hash for logins that match no account.
///
/// Verifying against it costs the same as a real check, so the response
/// time does not reveal whether the login exists. Built on first use with
/// the configured parameters.
#[derive(Clone, Default)]
pub struct DecoyHash(Arc<OnceCell<String>>);

impl DecoyHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify `password` against the decoy. Always `false`.
    pub async fn verify(&self, params: PasswordParams, password: String) -> Result<bool, AppError> {
        let stored = self
            .0
            .get_or_try_init(|| hash(params, "quire-decoy-password".to_string()))
            .await?
            .clone();
        verify(password, stored).await
    }
}

impl std::fmt::Debug for DecoyHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoyHash")
            .field("initialized", &self.0.initialized())
            .finish()
    }
}
