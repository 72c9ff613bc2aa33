//! Redis-backed code store.

use crate::error::ExchangeError;
use crate::store::{
    token_expiry, CodeExchange, VerificationCode, VerificationToken, CODE_RETENTION,
    TEST_DATE_FORMAT,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

// KEYS[1] code hash, KEYS[2] token hash
// ARGV[1] now (unix secs), ARGV[2] token expiry (unix secs), ARGV[3] token ttl (secs)
const EXCHANGE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {'not_found'}
end
if redis.call('HGET', KEYS[1], 'claimed') == '1' then
  return {'used'}
end
local expires_at = tonumber(redis.call('HGET', KEYS[1], 'expires_at'))
if expires_at == nil or expires_at <= tonumber(ARGV[1]) then
  return {'expired'}
end
redis.call('HSET', KEYS[1], 'claimed', '1')
local test_type = redis.call('HGET', KEYS[1], 'test_type') or ''
local test_date = redis.call('HGET', KEYS[1], 'test_date') or ''
redis.call('HSET', KEYS[2], 'test_type', test_type, 'test_date', test_date, 'expires_at', ARGV[2])
redis.call('EXPIRE', KEYS[2], ARGV[3])
return {'ok', test_type, test_date}
"#;

const TOKEN_FIELDS: &[&str] = &["test_type", "test_date", "expires_at"];

fn code_key(code: &str) -> String {
    format!("verification_code:{}", code)
}

fn token_key(token_id: &str) -> String {
    format!("verification_token:{}", token_id)
}

/// Code store backed by Redis hashes.
///
/// The exchange runs as a single Lua script, which Redis executes
/// atomically, so claim and token creation cannot interleave with another
/// exchange of the same code.
pub struct RedisCodeStore {
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisCodeStore {
    /// Connect to Redis at `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::StoreUnavailable`] if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, ExchangeError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(RedisCodeStore {
            conn,
            script: redis::Script::new(EXCHANGE_SCRIPT),
        })
    }

    /// Register a code. The key outlives the code's expiry by
    /// [`CODE_RETENTION`] so that late exchanges still report expiry or prior
    /// use instead of not-found.
    pub async fn issue_code(&self, code: &VerificationCode) -> Result<(), ExchangeError> {
        let mut conn = self.conn.clone();
        let key = code_key(&code.code);
        let test_date = code
            .test_date
            .map(|d| d.format(TEST_DATE_FORMAT).to_string())
            .unwrap_or_default();
        let claimed = if code.claimed { "1" } else { "0" };
        let expires_at = code.expires_at.timestamp();

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                &key,
                &[
                    ("test_type", code.test_type.clone()),
                    ("test_date", test_date),
                    ("expires_at", expires_at.to_string()),
                    ("claimed", claimed.to_string()),
                ],
            )
            .ignore()
            .cmd("EXPIREAT")
            .arg(&key)
            .arg(expires_at.saturating_add(CODE_RETENTION.as_secs() as i64))
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Token record issued under `token_id`, if it has not expired.
    pub async fn get_token(&self, token_id: &str) -> Result<Option<VerificationToken>, ExchangeError> {
        let mut conn = self.conn.clone();
        let fields: Vec<Option<String>> = conn
            .hget(token_key(token_id), TOKEN_FIELDS)
            .await?;

        match fields.as_slice() {
            [Some(test_type), test_date, Some(expires_at)] => {
                let expires_at = expires_at
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .ok_or_else(|| ExchangeError::unavailable("corrupt token expiry"))?;
                Ok(Some(VerificationToken {
                    token_id: token_id.to_string(),
                    test_type: test_type.clone(),
                    test_date: parse_test_date(test_date.as_deref().unwrap_or(""))?,
                    expires_at,
                }))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CodeExchange for RedisCodeStore {
    async fn exchange(
        &self,
        code: &str,
        duration: Duration,
    ) -> Result<VerificationToken, ExchangeError> {
        let mut conn = self.conn.clone();
        let now = Utc::now();
        let expires_at = token_expiry(now, duration)?;
        let token_id = uuid::Uuid::new_v4().to_string();

        let reply: Vec<String> = self
            .script
            .key(code_key(code))
            .key(token_key(&token_id))
            .arg(now.timestamp())
            .arg(expires_at.timestamp())
            .arg(duration.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;

        let (test_type, test_date) = parse_exchange_reply(&reply)?;
        debug!(token_id = %token_id, "Claimed verification code");

        Ok(VerificationToken {
            token_id,
            test_type,
            test_date,
            expires_at,
        })
    }
}

/// Interpret the exchange script's reply.
fn parse_exchange_reply(reply: &[String]) -> Result<(String, Option<NaiveDate>), ExchangeError> {
    match reply {
        [status, test_type, test_date] if status == "ok" => {
            Ok((test_type.clone(), parse_test_date(test_date)?))
        }
        [status] if status == "not_found" => Err(ExchangeError::CodeNotFound),
        [status] if status == "used" => Err(ExchangeError::CodeAlreadyUsed),
        [status] if status == "expired" => Err(ExchangeError::CodeExpired),
        other => Err(ExchangeError::unavailable(format!(
            "unexpected exchange reply: {:?}",
            other
        ))),
    }
}

fn parse_test_date(value: &str) -> Result<Option<NaiveDate>, ExchangeError> {
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, TEST_DATE_FORMAT)
        .map(Some)
        .map_err(|e| ExchangeError::unavailable(format!("corrupt test date: {}", e)))
}
