//! Request and response bodies of the verify endpoint.
//!
//! Transport is left to the embedding server: it hands raw body bytes to
//! [`TokenIssuer::handle_json`](crate::issuer::TokenIssuer::handle_json) and
//! writes back the returned [`ApiResponse`].

pub mod error;

pub use error::ApiError;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Inbound request carrying the verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    /// The short-lived code to exchange
    #[serde(rename = "code")]
    pub verification_code: String,
}

impl VerifyCodeRequest {
    /// Create a request for `code`.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            verification_code: code.into(),
        }
    }

    /// Check the request before any downstream call.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedRequest`] if the code is empty.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.verification_code.is_empty() {
            return Err(ApiError::malformed("verification code is required"));
        }
        Ok(())
    }

    /// Parse and validate a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedRequest`] for unparseable JSON, a
    /// missing `code` field, or an empty code.
    pub fn from_json(body: &[u8]) -> Result<Self, ApiError> {
        let request: Self =
            serde_json::from_slice(body).map_err(|e| ApiError::malformed(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }
}

/// Successful exchange result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    /// Category of the reported test
    #[serde(rename = "testtype")]
    pub test_type: String,
    /// Test date as `YYYY-MM-DD`, or empty
    #[serde(rename = "testdate")]
    pub test_date: String,
    /// Signed verification token
    #[serde(rename = "token")]
    pub verification_token: String,
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message
    pub error: String,
}

/// Body of an [`ApiResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Exchange succeeded
    Success(VerifyCodeResponse),
    /// Exchange failed
    Error(ErrorResponse),
}

/// Status code and JSON body to send back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// Transport status
    pub status: StatusCode,
    /// JSON body
    pub body: ResponseBody,
}

impl ApiResponse {
    /// 200 response carrying a verification token.
    #[must_use]
    pub fn success(response: VerifyCodeResponse) -> Self {
        Self {
            status: StatusCode::OK,
            body: ResponseBody::Success(response),
        }
    }

    /// Response carrying an error body.
    #[must_use]
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ResponseBody::Error(ErrorResponse {
                error: message.into(),
            }),
        }
    }

    /// The success payload, if any.
    #[must_use]
    pub fn verify_response(&self) -> Option<&VerifyCodeResponse> {
        match &self.body {
            ResponseBody::Success(response) => Some(response),
            ResponseBody::Error(_) => None,
        }
    }

    /// The error message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Success(_) => None,
            ResponseBody::Error(err) => Some(&err.error),
        }
    }

    /// Serialize the body.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_default()
    }
}
