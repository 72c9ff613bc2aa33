//! Centralized configuration for the verification service.
//!
//! All configuration is loaded from environment variables and validated
//! at startup. The issuer itself only ever sees the immutable
//! [`IssuerConfig`] derived from it.

use crate::error::TokenError;
use std::env;
use std::time::Duration;

/// Default issuer and audience.
pub const DEFAULT_TOKEN_ISSUER: &str = "diagnosis-verification-example";

/// Default verification token lifetime (24 hours).
pub const DEFAULT_TOKEN_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Backing store for verification codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeStoreProvider {
    /// Process-local store, for development and tests
    Memory,
    /// Redis-backed store
    Redis {
        /// Connection URL
        url: String,
    },
}

/// Settings consumed by [`TokenIssuer`](crate::issuer::TokenIssuer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerConfig {
    /// Identifier of the signing key handed to the key manager
    pub signing_key_id: String,
    /// Value of both the `iss` and `aud` claims
    pub issuer: String,
    /// Lifetime of issued verification tokens
    pub token_duration: Duration,
}

impl IssuerConfig {
    /// Create an issuer configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the key id or issuer is empty, or the duration is
    /// shorter than one second or too long to express as a token expiry.
    pub fn new(
        signing_key_id: impl Into<String>,
        issuer: impl Into<String>,
        token_duration: Duration,
    ) -> Result<Self, TokenError> {
        let config = Self {
            signing_key_id: signing_key_id.into(),
            issuer: issuer.into(),
            token_duration,
        };
        config.validate()?;
        Ok(config)
    }

    /// Token lifetime in whole seconds, as used for `exp`.
    #[must_use]
    pub fn token_duration_secs(&self) -> i64 {
        i64::try_from(self.token_duration.as_secs()).unwrap_or(i64::MAX)
    }

    fn validate(&self) -> Result<(), TokenError> {
        if self.signing_key_id.is_empty() {
            return Err(TokenError::config("TOKEN_SIGNING_KEY must not be empty"));
        }
        if self.issuer.is_empty() {
            return Err(TokenError::config("TOKEN_ISSUER must not be empty"));
        }
        if self.token_duration.as_secs() == 0 {
            return Err(TokenError::config(
                "VERIFICATION_TOKEN_DURATION must be at least 1s",
            ));
        }
        if chrono::Duration::from_std(self.token_duration).is_err() {
            return Err(TokenError::config("VERIFICATION_TOKEN_DURATION is out of range"));
        }
        Ok(())
    }
}

/// Verification service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Signing key identifier
    pub token_signing_key: String,
    /// JWT issuer and audience
    pub token_issuer: String,
    /// Verification token lifetime
    pub verification_token_duration: Duration,
    /// Code store backend
    pub code_store: CodeStoreProvider,
    /// Default log filter
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, TokenError> {
        dotenvy::dotenv().ok();

        let token_signing_key = env::var("TOKEN_SIGNING_KEY")
            .map_err(|_| TokenError::config("TOKEN_SIGNING_KEY is required"))?;
        let token_issuer =
            env::var("TOKEN_ISSUER").unwrap_or_else(|_| DEFAULT_TOKEN_ISSUER.to_string());
        let verification_token_duration = match env::var("VERIFICATION_TOKEN_DURATION") {
            Ok(val) => parse_duration(&val).map_err(|e| {
                TokenError::config(format!("Invalid VERIFICATION_TOKEN_DURATION: {}", e))
            })?,
            Err(_) => DEFAULT_TOKEN_DURATION,
        };

        let code_store = match env::var("CODE_STORE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => CodeStoreProvider::Memory,
            "redis" => CodeStoreProvider::Redis {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            other => {
                return Err(TokenError::config(format!("Invalid CODE_STORE: {}", other)));
            }
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = parse_env("LOG_JSON", false)?;

        let config = Self {
            token_signing_key,
            token_issuer,
            verification_token_duration,
            code_store,
            log_level,
            log_json,
        };
        config.issuer_config()?;
        Ok(config)
    }

    /// Build the immutable configuration handed to the issuer.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer settings are invalid.
    pub fn issuer_config(&self) -> Result<IssuerConfig, TokenError> {
        IssuerConfig::new(
            self.token_signing_key.clone(),
            self.token_issuer.clone(),
            self.verification_token_duration,
        )
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, TokenError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| TokenError::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Parse a duration such as `90s`, `15m`, `24h` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 60 * 60),
        Some(_) => (value, 1),
        None => return Err("empty duration".to_string()),
    };
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("'{}' is not a duration", value))?;
    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("'{}' is out of range", value))
}
