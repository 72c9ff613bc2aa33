//! Deterministic key manager for tests.

use crate::error::TokenError;
use crate::kms::{KeyManager, TokenSigner};
use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use ring::hmac;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How a [`MockKeyManager`] behaves when asked for a signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Hand out a working deterministic signer.
    Available,
    /// Fail resolution with `KeyUnavailable`.
    Unavailable,
    /// Hand out a signer whose `sign` always fails.
    FailSigning,
}

/// Deterministic key manager for tests. Signatures are HMAC-SHA256 over the
/// signing input and carry no ECDSA meaning.
pub struct MockKeyManager {
    behavior: MockBehavior,
    secret: Vec<u8>,
    resolutions: AtomicUsize,
}

impl MockKeyManager {
    /// Create a mock with the given behavior and a fixed secret.
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        MockKeyManager {
            behavior,
            secret: b"mock-kms-secret-key-for-testing-purposes-only!".to_vec(),
            resolutions: AtomicUsize::new(0),
        }
    }

    /// Use a different HMAC secret.
    #[must_use]
    pub fn with_secret(mut self, secret: Vec<u8>) -> Self {
        self.secret = secret;
        self
    }

    /// Number of times `new_signer` was called.
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyManager for MockKeyManager {
    async fn new_signer(&self, key_id: &str) -> Result<Arc<dyn TokenSigner>, TokenError> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockBehavior::Unavailable => Err(TokenError::key_unavailable(format!(
                "mock key {} unavailable",
                key_id
            ))),
            behavior => Ok(Arc::new(MockSigner {
                key_id: key_id.to_string(),
                secret: self.secret.clone(),
                fail: behavior == MockBehavior::FailSigning,
            })),
        }
    }
}

/// Signer handed out by [`MockKeyManager`].
pub struct MockSigner {
    key_id: String,
    secret: Vec<u8>,
    fail: bool,
}

impl MockSigner {
    /// Expected signature for `data`, for assertions.
    pub fn expected_signature(secret: &[u8], data: &[u8]) -> Vec<u8> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
        hmac::sign(&key, data).as_ref().to_vec()
    }
}

#[async_trait]
impl TokenSigner for MockSigner {
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, TokenError> {
        if self.fail {
            return Err(TokenError::signing("mock signing failure"));
        }
        Ok(Self::expected_signature(&self.secret, data))
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ES256
    }
}
