//! Caller-visible error taxonomy.

use crate::api::ApiResponse;
use crate::error::ExchangeError;
use http::StatusCode;
use thiserror::Error;

/// Message for every failure to obtain a signer.
pub const KEY_UNAVAILABLE_MESSAGE: &str = "internal server error - unable to sign tokens";

/// Message for store failures and unknown codes.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Message when signing fails after the code was consumed.
pub const SIGNING_FAILED_MESSAGE: &str = "error signing token, must obtain new verification code";

/// Every outcome of a failed exchange, as the caller sees it.
///
/// Collaborator error text never reaches the caller; only the variants
/// carrying caller-supplied detail render it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Body did not parse or lacked a code.
    #[error("invalid request: {0}")]
    MalformedRequest(String),

    /// Code expired or already used.
    #[error("{0}")]
    InvalidCode(ExchangeError),

    /// No signing key could be resolved.
    #[error("{}", KEY_UNAVAILABLE_MESSAGE)]
    KeyUnavailable,

    /// Unknown code or store failure.
    #[error("{}", INTERNAL_ERROR_MESSAGE)]
    Internal,

    /// Signing failed after the code was consumed.
    #[error("{}", SIGNING_FAILED_MESSAGE)]
    SigningFailed,
}

impl ApiError {
    /// Create a malformed request error.
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    /// Transport status for this error.
    ///
    /// Malformed requests keep a 200 status with an error body, which
    /// existing clients depend on.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) => StatusCode::OK,
            Self::InvalidCode(_) => StatusCode::BAD_REQUEST,
            Self::KeyUnavailable | Self::Internal | Self::SigningFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render as a response.
    #[must_use]
    pub fn into_response(self) -> ApiResponse {
        ApiResponse::error(self.status(), self.to_string())
    }
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        if err.is_caller_error() {
            Self::InvalidCode(err)
        } else {
            Self::Internal
        }
    }
}
