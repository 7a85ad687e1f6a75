//! # Runtime Configuration
//!
//! Everything the service reads from the environment, parsed once at
//! startup into an [`AppConfig`].
//!
//! | Variable                           | Default                      |
//! |------------------------------------|------------------------------|
//! | `PORT`                             | `8080`                       |
//! | `DATABASE_URL`                     | `sqlite://quire.db?mode=rwc` |
//! | `QUIRE_ENV`                        | `development`                |
//! | `QUIRE_JWT_SECRET`                 | ephemeral (required in prod) |
//! | `QUIRE_TOKEN_TTL_SECS`             | `3600`                       |
//! | `QUIRE_STRICT_SESSIONS`            | `true`                       |
//! | `QUIRE_RATE_LIMIT`                 | on in production only        |
//! | `QUIRE_RATE_LIMIT_EXEMPT_LOOPBACK` | off in production only       |
//! | `QUIRE_REQUEST_TIMEOUT_SECS`       | `30`                         |
//! | `QUIRE_METRICS_ENABLED`            | `true`                       |
//! | `QUIRE_LOG_FORMAT`                 | `pretty` (`json` in prod)    |
//! | `QUIRE_ARGON2_MEMORY_KIB`          | `19456`                      |
//! | `QUIRE_ARGON2_ITERATIONS`          | `2`                          |

use std::time::Duration;

use quire_core::RateLimiterConfig;
use rand_core::{OsRng, RngCore};

/// Minimum signing secret length accepted in production.
pub const MIN_SECRET_BYTES: usize = 32;

/// Longest accepted token lifetime (ten years).
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Configuration errors surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("QUIRE_JWT_SECRET must be set when QUIRE_ENV=production")]
    MissingSecret,

    #[error("QUIRE_JWT_SECRET must be at least {MIN_SECRET_BYTES} bytes in production")]
    SecretTooShort,

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment designation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("production") || v.eq_ignore_ascii_case("prod") => {
                Self::Production
            }
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Token signing secret. `Debug` never prints the bytes.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// 32 random bytes from the OS.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Argon2id cost parameters for new password hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub environment: Environment,
    pub jwt_secret: SigningSecret,
    /// True when no secret was configured and one was generated at startup.
    pub jwt_secret_ephemeral: bool,
    pub token_ttl_secs: u64,
    /// Require a live session row for every token, not just a valid signature.
    pub strict_sessions: bool,
    pub rate_limit: RateLimiterConfig,
    pub request_timeout: Duration,
    pub metrics_enabled: bool,
    pub log_format: LogFormat,
    pub password: PasswordParams,
}

impl Default for AppConfig {
    /// Development defaults with an ephemeral secret and rate limiting off.
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite://quire.db?mode=rwc".to_string(),
            environment: Environment::Development,
            jwt_secret: SigningSecret::generate(),
            jwt_secret_ephemeral: true,
            token_ttl_secs: 3600,
            strict_sessions: true,
            rate_limit: RateLimiterConfig {
                enabled: false,
                ..RateLimiterConfig::default()
            },
            request_timeout: Duration::from_secs(30),
            metrics_enabled: true,
            log_format: LogFormat::Pretty,
            password: PasswordParams::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let environment = Environment::parse(get("QUIRE_ENV").as_deref());
        let production = environment.is_production();

        let (jwt_secret, jwt_secret_ephemeral) = match get("QUIRE_JWT_SECRET") {
            Some(secret) if production && secret.len() < MIN_SECRET_BYTES => {
                return Err(ConfigError::SecretTooShort)
            }
            Some(secret) => (SigningSecret::new(secret.into_bytes()), false),
            None if production => return Err(ConfigError::MissingSecret),
            None => (SigningSecret::generate(), true),
        };

        let rate_limit = RateLimiterConfig {
            enabled: parse_bool(get("QUIRE_RATE_LIMIT"), "QUIRE_RATE_LIMIT", production)?,
            exempt_loopback: parse_bool(
                get("QUIRE_RATE_LIMIT_EXEMPT_LOOPBACK"),
                "QUIRE_RATE_LIMIT_EXEMPT_LOOPBACK",
                !production,
            )?,
            ..RateLimiterConfig::default()
        };

        let log_format = match get("QUIRE_LOG_FORMAT").as_deref().map(str::trim) {
            None if production => LogFormat::Json,
            None => LogFormat::Pretty,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    var: "QUIRE_LOG_FORMAT",
                    value: v.to_string(),
                    reason: "expected `json` or `pretty`".to_string(),
                })
            }
        };

        let token_ttl_secs: u64 = parse_num(get("QUIRE_TOKEN_TTL_SECS"), "QUIRE_TOKEN_TTL_SECS", 3600)?;
        if token_ttl_secs == 0 || token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Invalid {
                var: "QUIRE_TOKEN_TTL_SECS",
                value: token_ttl_secs.to_string(),
                reason: format!("must be between 1 and {MAX_TOKEN_TTL_SECS}"),
            });
        }
        let timeout_secs: u64 =
            parse_num(get("QUIRE_REQUEST_TIMEOUT_SECS"), "QUIRE_REQUEST_TIMEOUT_SECS", 30)?;

        Ok(Self {
            port: parse_num(get("PORT"), "PORT", 8080)?,
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://quire.db?mode=rwc".to_string()),
            environment,
            jwt_secret,
            jwt_secret_ephemeral,
            token_ttl_secs,
            strict_sessions: parse_bool(get("QUIRE_STRICT_SESSIONS"), "QUIRE_STRICT_SESSIONS", true)?,
            rate_limit,
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            metrics_enabled: parse_bool(get("QUIRE_METRICS_ENABLED"), "QUIRE_METRICS_ENABLED", true)?,
            log_format,
            password: PasswordParams {
                memory_kib: parse_num(get("QUIRE_ARGON2_MEMORY_KIB"), "QUIRE_ARGON2_MEMORY_KIB", 19_456)?,
                iterations: parse_num(get("QUIRE_ARGON2_ITERATIONS"), "QUIRE_ARGON2_ITERATIONS", 2)?,
            },
        })
    }
}

fn parse_bool(raw: Option<String>, var: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_num<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn development_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.jwt_secret_ephemeral);
        assert_eq!(config.jwt_secret.expose().len(), 32);
        assert_eq!(config.token_ttl_secs, 3600);
        assert!(config.strict_sessions);
        assert!(!config.rate_limit.enabled);
        assert!(config.rate_limit.exempt_loopback);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn production_requires_secret() {
        let err = AppConfig::from_lookup(lookup(&[("QUIRE_ENV", "production")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));
    }

    #[test]
    fn production_rejects_short_secret() {
        let err = AppConfig::from_lookup(lookup(&[
            ("QUIRE_ENV", "production"),
            ("QUIRE_JWT_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::SecretTooShort));
    }

    #[test]
    fn production_enables_rate_limit_and_json_logs() {
        let config = AppConfig::from_lookup(lookup(&[
            ("QUIRE_ENV", "production"),
            ("QUIRE_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
        ]))
        .unwrap();
        assert!(config.rate_limit.enabled);
        assert!(!config.rate_limit.exempt_loopback);
        assert!(!config.jwt_secret_ephemeral);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn explicit_flags_override_environment() {
        let config = AppConfig::from_lookup(lookup(&[
            ("QUIRE_RATE_LIMIT", "on"),
            ("QUIRE_RATE_LIMIT_EXEMPT_LOOPBACK", "false"),
            ("QUIRE_STRICT_SESSIONS", "0"),
            ("QUIRE_TOKEN_TTL_SECS", "86400"),
            ("QUIRE_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert!(config.rate_limit.enabled);
        assert!(!config.rate_limit.exempt_loopback);
        assert!(!config.strict_sessions);
        assert_eq!(config.token_ttl_secs, 86_400);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        let err = AppConfig::from_lookup(lookup(&[("QUIRE_RATE_LIMIT", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("QUIRE_RATE_LIMIT"));
        let err = AppConfig::from_lookup(lookup(&[("QUIRE_TOKEN_TTL_SECS", "0")])).unwrap_err();
        assert!(err.to_string().contains("QUIRE_TOKEN_TTL_SECS"));
        let err = AppConfig::from_lookup(lookup(&[(
            "QUIRE_TOKEN_TTL_SECS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("QUIRE_TOKEN_TTL_SECS"));
    }

    #[test]
    fn debug_redacts_secret() {
        let config = AppConfig::from_lookup(lookup(&[("QUIRE_JWT_SECRET", "super-secret-value")]))
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("super-secret-value"));
        assert!(dbg.contains("REDACTED"));
    }
}
