//! Signing key resolution.
//!
//! A [`KeyManager`] turns a configured key identifier into a [`TokenSigner`]:
//! a capability that signs bytes with one private key and never exposes it.

pub mod local;
pub mod mock;

pub use local::{LocalKeyManager, LocalSigner};
pub use mock::{MockBehavior, MockKeyManager, MockSigner};

use crate::error::TokenError;
use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use std::sync::Arc;

/// Opaque handle bound to a single private key.
#[async_trait]
pub trait TokenSigner: Send + Sync {
    /// Sign data and return the raw signature. For ES256 this is the
    /// fixed-width `r || s` encoding used by JWS.
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, TokenError>;

    /// Key ID for the JWT header.
    fn key_id(&self) -> &str;

    /// Algorithm for the JWT header.
    fn algorithm(&self) -> Algorithm;
}

/// Source of signing handles, typically backed by a KMS.
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Resolve an active signer for `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyUnavailable`] if no active key can be supplied.
    async fn new_signer(&self, key_id: &str) -> Result<Arc<dyn TokenSigner>, TokenError>;
}
