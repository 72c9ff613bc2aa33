//! Error types for the verification token service.
//!
//! [`ExchangeError`] is the taxonomy reported by code stores, [`TokenError`]
//! covers signing, encoding and configuration failures. Neither is shown to
//! callers directly; the issuer converts both into
//! [`ApiError`](crate::api::ApiError).

use thiserror::Error;

/// Errors reported by a [`CodeExchange`](crate::store::CodeExchange) store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The code is unknown to the store.
    #[error("verification code not found")]
    CodeNotFound,

    /// The code existed but its validity window has elapsed.
    #[error("verification code expired")]
    CodeExpired,

    /// The code was already exchanged for a token.
    #[error("verification code used")]
    CodeAlreadyUsed,

    /// The requested token duration cannot be represented as an expiry.
    #[error("invalid token duration: {0}")]
    InvalidDuration(String),

    /// Transient infrastructure failure unrelated to the code itself.
    #[error("code store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ExchangeError {
    /// Create a store unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Whether the caller caused this error and may be told so.
    ///
    /// Not-found is excluded: responses must not reveal which codes exist.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(self, Self::CodeExpired | Self::CodeAlreadyUsed)
    }

    /// Short label used for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::CodeNotFound => "not_found",
            Self::CodeExpired => "expired",
            Self::CodeAlreadyUsed => "used",
            Self::InvalidDuration(_) => "invalid_duration",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<redis::RedisError> for ExchangeError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// Errors from key management, signing and configuration.
#[derive(Error, Debug)]
pub enum TokenError {
    /// No active signing key could be supplied for the configured identifier.
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// A resolved signing handle failed to produce a signature.
    #[error("Signing error: {0}")]
    Signing(String),

    /// JWT header or claims could not be encoded.
    #[error("JWT encoding error: {0}")]
    JwtEncoding(String),

    /// JWT could not be decoded or verified.
    #[error("JWT decoding error: {0}")]
    JwtDecoding(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Code store failure outside of an exchange, e.g. while registering codes.
    #[error("Store error: {0}")]
    Store(#[from] ExchangeError),
}

impl TokenError {
    /// Create a key unavailable error.
    #[must_use]
    pub fn key_unavailable(msg: impl Into<String>) -> Self {
        Self::KeyUnavailable(msg.into())
    }

    /// Create a signing error.
    #[must_use]
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::JwtDecoding(err.to_string())
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        Self::JwtEncoding(err.to_string())
    }
}
