//! Verification Service library.
//!
//! Exchanges short-lived verification codes for signed ES256 verification
//! tokens. Codes are consumed atomically by a [`store::CodeExchange`]
//! implementation and tokens are signed through a [`kms::KeyManager`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod error;
pub mod issuer;
pub mod jwt;
pub mod kms;
pub mod metrics;
pub mod observability;
pub mod store;

// Re-exports for convenience
pub use api::{ApiError, ApiResponse, VerifyCodeRequest, VerifyCodeResponse};
pub use config::{Config, IssuerConfig};
pub use error::{ExchangeError, TokenError};
pub use issuer::{Stage, TokenIssuer};
