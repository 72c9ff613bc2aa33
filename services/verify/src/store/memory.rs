//! Process-local code store.

use crate::error::ExchangeError;
use crate::store::{token_expiry, CodeExchange, VerificationCode, VerificationToken, CODE_RETENTION};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Minimum seconds between two sweeps triggered by exchanges.
const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Default)]
struct State {
    codes: HashMap<String, VerificationCode>,
    tokens: HashMap<String, VerificationToken>,
    next_sweep: DateTime<Utc>,
}

impl State {
    /// Drop expired tokens and codes past their retention window.
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.codes.len() + self.tokens.len();
        self.tokens.retain(|_, token| token.expires_at > now);
        self.codes.retain(|_, code| is_retained(code, now));
        self.next_sweep = now
            .checked_add_signed(chrono::Duration::seconds(SWEEP_INTERVAL_SECS))
            .unwrap_or(now);
        before - (self.codes.len() + self.tokens.len())
    }

    fn sweep_if_due(&mut self, now: DateTime<Utc>) {
        if now >= self.next_sweep {
            let removed = self.sweep(now);
            if removed > 0 {
                debug!(removed, "Swept expired verification records");
            }
        }
    }
}

fn is_retained(code: &VerificationCode, now: DateTime<Utc>) -> bool {
    chrono::Duration::from_std(CODE_RETENTION)
        .ok()
        .and_then(|retention| code.expires_at.checked_add_signed(retention))
        .map_or(true, |purge_at| purge_at > now)
}

/// Code store backed by a single mutex-guarded map.
///
/// Lookup, claim and token creation happen under one lock acquisition, so
/// concurrent exchanges of the same code cannot both succeed. Expired tokens
/// and codes older than [`CODE_RETENTION`] are swept lazily from
/// [`exchange_at`](Self::exchange_at), at most once per minute, matching the
/// key expiry of [`RedisCodeStore`](crate::store::RedisCodeStore).
#[derive(Default)]
pub struct InMemoryCodeStore {
    state: Mutex<State>,
}

impl InMemoryCodeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a code. An existing entry with the same code is replaced.
    pub async fn issue_code(&self, code: VerificationCode) {
        let mut state = self.state.lock().await;
        state.codes.insert(code.code.clone(), code);
    }

    /// Current record for `code`, unless it is past its retention window.
    pub async fn get_code(&self, code: &str) -> Option<VerificationCode> {
        let now = Utc::now();
        self.state
            .lock()
            .await
            .codes
            .get(code)
            .filter(|record| is_retained(record, now))
            .cloned()
    }

    /// Token record issued under `token_id`, if it has not expired.
    pub async fn get_token(&self, token_id: &str) -> Option<VerificationToken> {
        self.get_token_at(token_id, Utc::now()).await
    }

    /// Token record issued under `token_id`, if still valid at `now`.
    pub async fn get_token_at(&self, token_id: &str, now: DateTime<Utc>) -> Option<VerificationToken> {
        self.state
            .lock()
            .await
            .tokens
            .get(token_id)
            .filter(|token| token.expires_at > now)
            .cloned()
    }

    /// Number of token records currently held, expired or not.
    pub async fn issued_tokens(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Remove expired tokens and codes past retention as of `now`.
    /// Returns the number of records removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.state.lock().await.sweep(now)
    }

    /// Exchange as of an explicit point in time.
    pub async fn exchange_at(
        &self,
        code: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<VerificationToken, ExchangeError> {
        let expires_at = token_expiry(now, duration)?;

        let mut state = self.state.lock().await;
        state.sweep_if_due(now);
        let record = state.codes.get_mut(code).ok_or(ExchangeError::CodeNotFound)?;

        if record.claimed {
            return Err(ExchangeError::CodeAlreadyUsed);
        }
        if record.is_expired_at(now) {
            return Err(ExchangeError::CodeExpired);
        }
        record.claimed = true;

        let token = VerificationToken {
            token_id: uuid::Uuid::new_v4().to_string(),
            test_type: record.test_type.clone(),
            test_date: record.test_date,
            expires_at,
        };
        state.tokens.insert(token.token_id.clone(), token.clone());

        debug!(token_id = %token.token_id, "Claimed verification code");
        Ok(token)
    }
}

#[async_trait]
impl CodeExchange for InMemoryCodeStore {
    async fn exchange(
        &self,
        code: &str,
        duration: Duration,
    ) -> Result<VerificationToken, ExchangeError> {
        self.exchange_at(code, duration, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const HOUR: Duration = Duration::from_secs(3600);

    fn code(value: &str) -> VerificationCode {
        VerificationCode::new(value, "confirmed", NaiveDate::from_ymd_opt(2020, 7, 1), HOUR)
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let store = InMemoryCodeStore::new();
        store.issue_code(code("XYZ789")).await;

        let token = store.exchange("XYZ789", HOUR).await.unwrap();

        assert_eq!(token.test_type, "confirmed");
        assert_eq!(token.format_test_date(), "2020-07-01");
        assert_eq!(store.get_token(&token.token_id).await, Some(token));
        assert!(store.get_code("XYZ789").await.unwrap().claimed);
    }

    #[tokio::test]
    async fn test_exchange_unknown_code() {
        let store = InMemoryCodeStore::new();
        let result = store.exchange("missing", HOUR).await;
        assert_eq!(result, Err(ExchangeError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_exchange_twice_reports_used() {
        let store = InMemoryCodeStore::new();
        store.issue_code(code("XYZ789")).await;

        assert!(store.exchange("XYZ789", HOUR).await.is_ok());
        assert_eq!(
            store.exchange("XYZ789", HOUR).await,
            Err(ExchangeError::CodeAlreadyUsed)
        );
        assert_eq!(store.issued_tokens().await, 1);
    }

    #[tokio::test]
    async fn test_exchange_expired_code() {
        let store = InMemoryCodeStore::new();
        let expired_at = Utc::now();
        store.issue_code(code("ABC123").with_expires_at(expired_at)).await;

        let result = store
            .exchange_at("ABC123", HOUR, expired_at + chrono::Duration::seconds(1))
            .await;

        assert_eq!(result, Err(ExchangeError::CodeExpired));
        assert!(!store.get_code("ABC123").await.unwrap().claimed);
    }

    #[tokio::test]
    async fn test_used_takes_precedence_over_expired() {
        let store = InMemoryCodeStore::new();
        let now = Utc::now();
        store.issue_code(code("ABC123").with_expires_at(now + chrono::Duration::seconds(10))).await;

        store.exchange_at("ABC123", HOUR, now).await.unwrap();
        let result = store
            .exchange_at("ABC123", HOUR, now + chrono::Duration::seconds(20))
            .await;

        assert_eq!(result, Err(ExchangeError::CodeAlreadyUsed));
    }

    #[tokio::test]
    async fn test_token_expiry_follows_duration() {
        let store = InMemoryCodeStore::new();
        let now = Utc::now();
        store.issue_code(code("XYZ789")).await;

        let token = store.exchange_at("XYZ789", HOUR, now).await.unwrap();
        assert_eq!(token.expires_at, now + chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_get_token_hides_expired_token() {
        let store = InMemoryCodeStore::new();
        let issued_at = Utc::now() - chrono::Duration::hours(2);
        store.issue_code(code("XYZ789").with_expires_at(issued_at + chrono::Duration::seconds(1))).await;

        let token = store.exchange_at("XYZ789", HOUR, issued_at).await.unwrap();

        assert!(store.get_token(&token.token_id).await.is_none());
        assert_eq!(
            store.get_token_at(&token.token_id, issued_at).await,
            Some(token.clone())
        );
        assert!(store
            .get_token_at(&token.token_id, token.expires_at)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryCodeStore::new();
        let now = Utc::now();
        store.issue_code(code("OLD001").with_expires_at(now)).await;
        store.issue_code(code("NEW001")).await;
        store.issue_code(code("USED01")).await;
        let token = store.exchange_at("USED01", HOUR, now).await.unwrap();

        let later = now + chrono::Duration::days(2);
        assert_eq!(store.purge_expired(now).await, 0);
        assert_eq!(store.purge_expired(later).await, 4);

        assert_eq!(store.issued_tokens().await, 0);
        assert!(store.get_token_at(&token.token_id, now).await.is_none());
        assert!(store.get_code("OLD001").await.is_none());
    }

    #[tokio::test]
    async fn test_exchange_sweeps_stale_records() {
        let store = InMemoryCodeStore::new();
        let now = Utc::now();
        store.issue_code(code("FIRST1")).await;
        store
            .issue_code(code("SECOND").with_expires_at(now + chrono::Duration::days(7)))
            .await;

        store.exchange_at("FIRST1", HOUR, now).await.unwrap();
        let later = now + chrono::Duration::days(2);
        store.exchange_at("SECOND", HOUR, later).await.unwrap();

        assert_eq!(store.issued_tokens().await, 1);
        assert_eq!(
            store.exchange_at("FIRST1", HOUR, later).await,
            Err(ExchangeError::CodeNotFound)
        );
    }

    #[tokio::test]
    async fn test_used_code_retained_after_expiry() {
        let store = InMemoryCodeStore::new();
        let now = Utc::now();
        store.issue_code(code("XYZ789")).await;

        store.exchange_at("XYZ789", HOUR, now).await.unwrap();
        let result = store
            .exchange_at("XYZ789", HOUR, now + chrono::Duration::hours(12))
            .await;

        assert_eq!(result, Err(ExchangeError::CodeAlreadyUsed));
    }

    #[tokio::test]
    async fn test_unrepresentable_duration() {
        let store = InMemoryCodeStore::new();
        store.issue_code(code("XYZ789")).await;

        let result = store.exchange("XYZ789", Duration::MAX).await;

        assert!(matches!(result, Err(ExchangeError::InvalidDuration(_))));
        assert!(!store.get_code("XYZ789").await.unwrap().claimed);
    }
}
