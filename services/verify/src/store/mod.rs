//! Verification code storage.
//!
//! The only operation the issuer relies on is [`CodeExchange::exchange`],
//! which must consume a code and record the issued token as one atomic step.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryCodeStore;
pub use self::redis::RedisCodeStore;

use crate::config::CodeStoreProvider;
use crate::error::ExchangeError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Textual format of test dates, in tokens and responses.
pub const TEST_DATE_FORMAT: &str = "%Y-%m-%d";

/// How long a code record is kept after it expires. Within this window late
/// or repeated exchanges still report expiry or prior use, not not-found.
pub const CODE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry of a token issued at `now` for `duration`.
///
/// # Errors
///
/// Returns [`ExchangeError::InvalidDuration`] if the expiry is out of range.
pub fn token_expiry(now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>, ExchangeError> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| ExchangeError::InvalidDuration(format!("{}s", duration.as_secs())))
}

/// Formats an optional test date; a missing date is the empty string.
#[must_use]
pub fn format_test_date(test_date: Option<NaiveDate>) -> String {
    test_date
        .map(|date| date.format(TEST_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Record created by a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    /// Unique identifier, used as the JWT `jti`
    pub token_id: String,
    /// Category of the reported test
    pub test_type: String,
    /// Date the test was administered, if known
    pub test_date: Option<NaiveDate>,
    /// End of the token's validity
    pub expires_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Test date formatted as `YYYY-MM-DD`, or empty.
    #[must_use]
    pub fn format_test_date(&self) -> String {
        format_test_date(self.test_date)
    }
}

/// Store-side record of an issued verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    /// The short-lived code handed to the user
    pub code: String,
    /// Category of the reported test
    pub test_type: String,
    /// Date the test was administered, if known
    pub test_date: Option<NaiveDate>,
    /// End of the code's validity window
    pub expires_at: DateTime<Utc>,
    /// Whether the code was already exchanged
    pub claimed: bool,
}

impl VerificationCode {
    /// Create an unclaimed code valid for `validity` from now.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        test_type: impl Into<String>,
        test_date: Option<NaiveDate>,
        validity: Duration,
    ) -> Self {
        let expires_at = chrono::Duration::from_std(validity)
            .ok()
            .and_then(|validity| Utc::now().checked_add_signed(validity))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            code: code.into(),
            test_type: test_type.into(),
            test_date,
            expires_at,
            claimed: false,
        }
    }

    /// Override the expiry, e.g. to register an already expired code.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// A code is expired once `now` reaches its expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Atomic code consumption, the contract the issuer depends on.
#[async_trait]
pub trait CodeExchange: Send + Sync {
    /// Consume `code` and issue a token record valid for `duration`.
    ///
    /// At most one call per code may ever succeed, including under
    /// concurrent calls. Checks run in order: existence, prior use, expiry.
    ///
    /// # Errors
    ///
    /// Returns the matching [`ExchangeError`] when the code cannot be consumed.
    async fn exchange(
        &self,
        code: &str,
        duration: Duration,
    ) -> Result<VerificationToken, ExchangeError>;
}

/// Open the configured store.
///
/// # Errors
///
/// Returns [`ExchangeError::StoreUnavailable`] if Redis cannot be reached.
pub async fn connect(provider: &CodeStoreProvider) -> Result<Arc<dyn CodeExchange>, ExchangeError> {
    match provider {
        CodeStoreProvider::Memory => Ok(Arc::new(InMemoryCodeStore::new())),
        CodeStoreProvider::Redis { url } => Ok(Arc::new(RedisCodeStore::new(url).await?)),
    }
}
