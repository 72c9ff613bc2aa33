//! In-process ECDSA P-256 key manager.
//!
//! Keys live only in memory as parsed `ring` key pairs. PKCS#8 input is
//! zeroized once parsed. Disabling a key also revokes every signer already
//! handed out for it.

use crate::error::TokenError;
use crate::kms::{KeyManager, TokenSigner};
use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zeroize::Zeroizing;

struct KeyEntry {
    key_pair: Arc<EcdsaKeyPair>,
    enabled: Arc<AtomicBool>,
}

/// Key manager holding ES256 keys in process memory.
pub struct LocalKeyManager {
    keys: RwLock<HashMap<String, KeyEntry>>,
    rng: SystemRandom,
}

impl Default for LocalKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalKeyManager {
    /// Create an empty key manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }

    /// Generate a fresh P-256 key under `key_id` and return its public key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub async fn generate_key(&self, key_id: impl Into<String>) -> Result<Vec<u8>, TokenError> {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &self.rng)
            .map_err(|_| TokenError::key_unavailable("key generation failed"))?;
        self.import_pkcs8(key_id, pkcs8.as_ref().to_vec()).await
    }

    /// Import a PKCS#8 encoded P-256 private key and return its public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid P-256 key.
    pub async fn import_pkcs8(
        &self,
        key_id: impl Into<String>,
        pkcs8: Vec<u8>,
    ) -> Result<Vec<u8>, TokenError> {
        let key_id = key_id.into();
        let pkcs8 = Zeroizing::new(pkcs8);
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &self.rng)
                .map_err(|e| TokenError::key_unavailable(format!("invalid key {}: {}", key_id, e)))?;
        let public_key = key_pair.public_key().as_ref().to_vec();

        let entry = KeyEntry {
            key_pair: Arc::new(key_pair),
            enabled: Arc::new(AtomicBool::new(true)),
        };
        self.keys.write().await.insert(key_id.clone(), entry);

        info!(key_id = %key_id, "Imported signing key");
        Ok(public_key)
    }

    /// Uncompressed SEC1 public key for `key_id`, for use by verifiers.
    pub async fn public_key(&self, key_id: &str) -> Option<Vec<u8>> {
        self.keys
            .read()
            .await
            .get(key_id)
            .map(|entry| entry.key_pair.public_key().as_ref().to_vec())
    }

    /// Enable or disable a key. Returns false if the key is unknown.
    pub async fn set_enabled(&self, key_id: &str, enabled: bool) -> bool {
        match self.keys.read().await.get(key_id) {
            Some(entry) => {
                entry.enabled.store(enabled, Ordering::SeqCst);
                if !enabled {
                    warn!(key_id = %key_id, "Signing key disabled");
                }
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl KeyManager for LocalKeyManager {
    async fn new_signer(&self, key_id: &str) -> Result<Arc<dyn TokenSigner>, TokenError> {
        let keys = self.keys.read().await;
        let entry = keys
            .get(key_id)
            .ok_or_else(|| TokenError::key_unavailable(format!("unknown key {}", key_id)))?;

        if !entry.enabled.load(Ordering::SeqCst) {
            return Err(TokenError::key_unavailable(format!(
                "key {} is disabled",
                key_id
            )));
        }

        Ok(Arc::new(LocalSigner {
            key_id: key_id.to_string(),
            key_pair: Arc::clone(&entry.key_pair),
            enabled: Arc::clone(&entry.enabled),
            rng: self.rng.clone(),
        }))
    }
}

/// ES256 signer backed by a [`LocalKeyManager`] key.
pub struct LocalSigner {
    key_id: String,
    key_pair: Arc<EcdsaKeyPair>,
    enabled: Arc<AtomicBool>,
    rng: SystemRandom,
}

#[async_trait]
impl TokenSigner for LocalSigner {
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, TokenError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(TokenError::signing(format!(
                "key {} was revoked",
                self.key_id
            )));
        }

        let signature = self
            .key_pair
            .sign(&self.rng, data)
            .map_err(|_| TokenError::signing("ECDSA signing failed"))?;
        Ok(signature.as_ref().to_vec())
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ES256
    }
}
