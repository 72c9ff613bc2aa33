//! End-to-end tests for the code-to-token exchange.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use verify_service::jwt::{parse_subject, JwtSerializer};
use verify_service::kms::{LocalKeyManager, MockBehavior, MockKeyManager};
use verify_service::store::{CodeExchange, InMemoryCodeStore, VerificationCode, VerificationToken};
use verify_service::{ExchangeError, IssuerConfig, TokenIssuer, VerifyCodeRequest};

const KEY_ID: &str = "signer-1";
const ISSUER: &str = "diagnosis-verification-example";
const DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Counts calls before delegating to the in-memory store.
struct CountingStore {
    inner: Arc<InMemoryCodeStore>,
    calls: AtomicUsize,
}

impl CountingStore {
    fn new(inner: Arc<InMemoryCodeStore>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExchange for CountingStore {
    async fn exchange(
        &self,
        code: &str,
        duration: Duration,
    ) -> Result<VerificationToken, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exchange(code, duration).await
    }
}

/// Disables the signing key while the code is being consumed, revoking the
/// signer the issuer already holds.
struct RevokingStore {
    inner: Arc<InMemoryCodeStore>,
    keys: Arc<LocalKeyManager>,
}

#[async_trait]
impl CodeExchange for RevokingStore {
    async fn exchange(
        &self,
        code: &str,
        duration: Duration,
    ) -> Result<VerificationToken, ExchangeError> {
        self.keys.set_enabled(KEY_ID, false).await;
        self.inner.exchange(code, duration).await
    }
}

fn test_date() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2020, 7, 14)
}

fn config() -> IssuerConfig {
    IssuerConfig::new(KEY_ID, ISSUER, DURATION).unwrap()
}

async fn seeded_store() -> Arc<InMemoryCodeStore> {
    let store = Arc::new(InMemoryCodeStore::new());
    store
        .issue_code(VerificationCode::new(
            "XYZ789",
            "confirmed",
            test_date(),
            Duration::from_secs(3600),
        ))
        .await;
    store
        .issue_code(
            VerificationCode::new("ABC123", "likely", test_date(), Duration::from_secs(3600))
                .with_expires_at(Utc::now() - chrono::Duration::seconds(1)),
        )
        .await;
    store
}

async fn local_issuer() -> (TokenIssuer, Arc<InMemoryCodeStore>, Vec<u8>) {
    let keys = Arc::new(LocalKeyManager::new());
    let public_key = keys.generate_key(KEY_ID).await.unwrap();
    let store = seeded_store().await;
    let issuer = TokenIssuer::new(config(), keys, store.clone());
    (issuer, store, public_key)
}

#[tokio::test]
async fn test_valid_code_yields_verifiable_token() {
    let (issuer, store, public_key) = local_issuer().await;

    let response = issuer.handle_json(br#"{"code":"XYZ789"}"#).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.verify_response().unwrap();
    assert_eq!(body.test_type, "confirmed");
    assert_eq!(body.test_date, "2020-07-14");

    let segments: Vec<&str> = body.verification_token.split('.').collect();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')));

    let claims = JwtSerializer::verify(&body.verification_token, &public_key, ISSUER).unwrap();
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.aud, ISSUER);
    assert_eq!(claims.sub, "confirmed.2020-07-14");
    assert_eq!(parse_subject(&claims.sub), Some(("confirmed", "2020-07-14")));
    assert_eq!(claims.lifetime_secs(), DURATION.as_secs() as i64);

    let token = store.get_token(&claims.jti).await.unwrap();
    assert_eq!(token.test_type, "confirmed");
    assert_eq!(token.test_date, test_date());
}

#[tokio::test]
async fn test_token_header_names_key() {
    let (issuer, _, _) = local_issuer().await;

    let response = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;
    let token = &response.verify_response().unwrap().verification_token;

    let header = jsonwebtoken::decode_header(token).unwrap();
    assert_eq!(header.alg, jsonwebtoken::Algorithm::ES256);
    assert_eq!(header.kid.as_deref(), Some(KEY_ID));
    assert_eq!(header.typ.as_deref(), Some("JWT"));
}

#[tokio::test]
async fn test_expired_code_rejected() {
    let (issuer, store, _) = local_issuer().await;

    let response = issuer.issue(VerifyCodeRequest::new("ABC123")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.error_message().unwrap().contains("expired"));
    assert!(response.verify_response().is_none());
    assert_eq!(store.issued_tokens().await, 0);
}

#[tokio::test]
async fn test_replay_rejected() {
    let (issuer, _, _) = local_issuer().await;

    let first = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;
    assert_eq!(first.status, StatusCode::OK);

    for _ in 0..3 {
        let replay = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;
        assert_eq!(replay.status, StatusCode::BAD_REQUEST);
        assert_eq!(replay.error_message(), Some("verification code used"));
    }
}

#[tokio::test]
async fn test_unknown_code_is_internal_error() {
    let (issuer, _, _) = local_issuer().await;

    let response = issuer.issue(VerifyCodeRequest::new("   ")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_message(), Some("internal server error"));
}

#[tokio::test]
async fn test_malformed_requests_never_reach_store() {
    let store = Arc::new(CountingStore::new(seeded_store().await));
    let issuer = TokenIssuer::new(
        config(),
        Arc::new(MockKeyManager::new(MockBehavior::Available)),
        store.clone(),
    );

    let bodies: [&[u8]; 5] = [
        b"",
        b"not json",
        b"{}",
        br#"{"code":""}"#,
        br#"{"code":null}"#,
    ];
    for body in bodies {
        let response = issuer.handle_json(body).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response
            .error_message()
            .unwrap()
            .starts_with("invalid request: "));
    }

    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_key_unavailable_leaves_code_usable() {
    let inner = seeded_store().await;
    let store = Arc::new(CountingStore::new(inner.clone()));
    let issuer = TokenIssuer::new(
        config(),
        Arc::new(MockKeyManager::new(MockBehavior::Unavailable)),
        store.clone(),
    );

    let response = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.error_message(),
        Some("internal server error - unable to sign tokens")
    );
    assert_eq!(store.calls(), 0);
    assert!(!inner.get_code("XYZ789").await.unwrap().claimed);

    let retry = TokenIssuer::new(
        config(),
        Arc::new(MockKeyManager::new(MockBehavior::Available)),
        inner,
    );
    let response = retry.issue(VerifyCodeRequest::new("XYZ789")).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_key_is_unavailable() {
    let keys = Arc::new(LocalKeyManager::new());
    keys.generate_key(KEY_ID).await.unwrap();
    keys.set_enabled(KEY_ID, false).await;
    let store = seeded_store().await;
    let issuer = TokenIssuer::new(config(), keys, store.clone());

    let response = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!store.get_code("XYZ789").await.unwrap().claimed);
}

#[tokio::test]
async fn test_signing_failure_consumes_code() {
    let store = seeded_store().await;
    let issuer = TokenIssuer::new(
        config(),
        Arc::new(MockKeyManager::new(MockBehavior::FailSigning)),
        store.clone(),
    );

    let response = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.error_message(),
        Some("error signing token, must obtain new verification code")
    );
    assert!(store.get_code("XYZ789").await.unwrap().claimed);

    let replay = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;
    assert_eq!(replay.error_message(), Some("verification code used"));
}

#[tokio::test]
async fn test_key_revoked_mid_request() {
    let keys = Arc::new(LocalKeyManager::new());
    keys.generate_key(KEY_ID).await.unwrap();
    let inner = seeded_store().await;
    let store = Arc::new(RevokingStore {
        inner: inner.clone(),
        keys: keys.clone(),
    });
    let issuer = TokenIssuer::new(config(), keys, store);

    let response = issuer.issue(VerifyCodeRequest::new("XYZ789")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.error_message(),
        Some("error signing token, must obtain new verification code")
    );
    assert!(inner.get_code("XYZ789").await.unwrap().claimed);
}

#[tokio::test]
async fn test_missing_test_date_formats_empty() {
    let store = Arc::new(InMemoryCodeStore::new());
    store
        .issue_code(VerificationCode::new(
            "NODATE",
            "negative",
            None,
            Duration::from_secs(60),
        ))
        .await;
    let keys = Arc::new(LocalKeyManager::new());
    let public_key = keys.generate_key(KEY_ID).await.unwrap();
    let issuer = TokenIssuer::new(config(), keys, store);

    let response = issuer.issue(VerifyCodeRequest::new("NODATE")).await;
    let body = response.verify_response().unwrap();

    assert_eq!(body.test_date, "");
    let claims = JwtSerializer::verify(&body.verification_token, &public_key, ISSUER).unwrap();
    assert_eq!(claims.sub, "negative.");
    assert_eq!(claims.subject_parts(), Some(("negative", "")));
}
