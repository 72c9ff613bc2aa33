//! Verification token claim set and subject encoding.

use serde::{Deserialize, Serialize};

/// Separator between test type and test date in the `sub` claim.
pub const SUBJECT_SEPARATOR: char = '.';

/// Claim set of a verification token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Issuer
    pub iss: String,
    /// Audience, always equal to the issuer
    pub aud: String,
    /// `{test_type}.{test_date}`
    pub sub: String,
    /// Token ID
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

impl Claims {
    /// Seconds between issuance and expiry.
    pub fn lifetime_secs(&self) -> i64 {
        self.exp - self.iat
    }

    /// Whether the token is expired at `timestamp` (Unix seconds).
    pub fn is_expired_at(&self, timestamp: i64) -> bool {
        timestamp >= self.exp
    }

    /// Splits the subject back into `(test_type, formatted_test_date)`.
    pub fn subject_parts(&self) -> Option<(&str, &str)> {
        parse_subject(&self.sub)
    }
}

/// Builds the `sub` claim from a test type and an already formatted test date.
pub fn subject_for(test_type: &str, formatted_test_date: &str) -> String {
    format!("{test_type}{SUBJECT_SEPARATOR}{formatted_test_date}")
}

/// Inverse of [`subject_for`]. Splits at the last separator, since formatted
/// dates never contain one.
pub fn parse_subject(subject: &str) -> Option<(&str, &str)> {
    subject.rsplit_once(SUBJECT_SEPARATOR)
}
