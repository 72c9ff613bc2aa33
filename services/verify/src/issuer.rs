//! Exchange of verification codes for signed verification tokens.
//!
//! Each request walks `Received → Validated → SignerResolved → CodeExchanged →
//! ClaimsBuilt → Signed → Responded`, or stops at the first failing stage.
//! Nothing is retried here: once the store has consumed a code, repeating
//! any step could issue a second token or mask the consumption.

use crate::api::{ApiError, ApiResponse, VerifyCodeRequest, VerifyCodeResponse};
use crate::config::IssuerConfig;
use crate::error::TokenError;
use crate::jwt::{JwtBuilder, JwtSerializer};
use crate::kms::KeyManager;
use crate::metrics;
use crate::store::CodeExchange;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Stage at which an exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request shape validation
    Validate,
    /// Signing key resolution
    ResolveSigner,
    /// Code consumption
    Exchange,
    /// Claim construction
    BuildClaims,
    /// Token signing
    Sign,
}

impl Stage {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::ResolveSigner => "resolve_signer",
            Self::Exchange => "exchange",
            Self::BuildClaims => "build_claims",
            Self::Sign => "sign",
        }
    }
}

/// A failed exchange: where it stopped, the metrics reason, and what the
/// caller is told.
struct Failure {
    stage: Stage,
    reason: &'static str,
    error: ApiError,
}

impl Failure {
    fn new(stage: Stage, reason: &'static str, error: ApiError) -> Self {
        Self {
            stage,
            reason,
            error,
        }
    }
}

/// Orchestrates the code-to-token exchange.
///
/// Holds no per-request state; share one instance across tasks.
pub struct TokenIssuer {
    config: IssuerConfig,
    key_manager: Arc<dyn KeyManager>,
    store: Arc<dyn CodeExchange>,
}

impl TokenIssuer {
    /// Create an issuer.
    #[must_use]
    pub fn new(
        config: IssuerConfig,
        key_manager: Arc<dyn KeyManager>,
        store: Arc<dyn CodeExchange>,
    ) -> Self {
        Self {
            config,
            key_manager,
            store,
        }
    }

    /// Configuration this issuer was built with.
    #[must_use]
    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Handle a raw JSON request body.
    pub async fn handle_json(&self, body: &[u8]) -> ApiResponse {
        match VerifyCodeRequest::from_json(body) {
            Ok(request) => self.issue(request).await,
            Err(err) => {
                warn!(error = %err, "Failed to bind request");
                metrics::record_exchange_failure(Stage::Validate.as_str(), "malformed");
                err.into_response()
            }
        }
    }

    /// Exchange the request's code for a signed token.
    pub async fn issue(&self, request: VerifyCodeRequest) -> ApiResponse {
        match self.try_issue(&request).await {
            Ok(response) => {
                metrics::record_token_issued(&response.test_type);
                ApiResponse::success(response)
            }
            Err(failure) => {
                metrics::record_exchange_failure(failure.stage.as_str(), failure.reason);
                failure.error.into_response()
            }
        }
    }

    #[instrument(skip_all, fields(key_id = %self.config.signing_key_id))]
    async fn try_issue(
        &self,
        request: &VerifyCodeRequest,
    ) -> Result<VerifyCodeResponse, Failure> {
        request.validate().map_err(|err| {
            warn!(error = %err, "Invalid request");
            Failure::new(Stage::Validate, "malformed", err)
        })?;

        let signer = self
            .key_manager
            .new_signer(&self.config.signing_key_id)
            .await
            .map_err(|err| {
                error!(error = %err, "Unable to get signing key");
                Failure::new(Stage::ResolveSigner, "key_unavailable", ApiError::KeyUnavailable)
            })?;

        let token = self
            .store
            .exchange(&request.verification_code, self.config.token_duration)
            .await
            .map_err(|err| {
                if err.is_caller_error() {
                    warn!(error = %err, "Rejected verification code");
                } else {
                    error!(error = %err, "Error issuing verification token");
                }
                Failure::new(Stage::Exchange, err.reason(), ApiError::from(err))
            })?;

        let test_date = token.format_test_date();
        let claims = JwtBuilder::new(self.config.issuer.as_str())
            .test_subject(&token.test_type, &test_date)
            .token_id(token.token_id.as_str())
            .ttl_seconds(self.config.token_duration_secs())
            .issued_at(Utc::now())
            .build()
            .map_err(|err| {
                error!(token_id = %token.token_id, error = %err, "Unable to build claims");
                Failure::new(Stage::BuildClaims, "invalid_claims", ApiError::SigningFailed)
            })?;

        let started = Instant::now();
        let signed = JwtSerializer::sign(&claims, signer.as_ref()).await;
        metrics::record_signing_latency(started.elapsed().as_secs_f64());
        let verification_token = signed.map_err(|err: TokenError| {
            error!(token_id = %token.token_id, error = %err, "Error signing token");
            Failure::new(Stage::Sign, "signing_failed", ApiError::SigningFailed)
        })?;

        info!(token_id = %token.token_id, test_type = %token.test_type, "Issued verification token");

        Ok(VerifyCodeResponse {
            test_type: token.test_type,
            test_date,
            verification_token,
        })
    }
}
