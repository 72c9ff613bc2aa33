//! Fluent construction of verification token claims.

use crate::jwt::claims::{subject_for, Claims};
use chrono::{DateTime, Utc};

/// Assembles verification token claims.
///
/// Issuer and audience are always the same configured value; issued-at
/// defaults to the moment [`build`](Self::build) is called.
pub struct JwtBuilder {
    issuer: String,
    subject: Option<String>,
    token_id: Option<String>,
    ttl_seconds: i64,
    issued_at: Option<DateTime<Utc>>,
}

impl JwtBuilder {
    /// Start a builder for tokens issued by `issuer`.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        JwtBuilder {
            issuer: issuer.into(),
            subject: None,
            token_id: None,
            ttl_seconds: 24 * 60 * 60,
            issued_at: None,
        }
    }

    /// Sets the `sub` claim verbatim.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the subject to `{test_type}.{formatted_test_date}`.
    #[must_use]
    pub fn test_subject(self, test_type: &str, formatted_test_date: &str) -> Self {
        self.subject(subject_for(test_type, formatted_test_date))
    }

    /// Sets the `jti` claim.
    #[must_use]
    pub fn token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    /// Token lifetime; `exp` is `iat` plus this many seconds.
    #[must_use]
    pub fn ttl_seconds(mut self, ttl: i64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    /// Fixes `iat` instead of using the current time.
    #[must_use]
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    /// Produce the claim set.
    ///
    /// # Errors
    ///
    /// Fails if the subject or token id is missing, or the TTL is not
    /// positive or overflows `exp`.
    pub fn build(self) -> Result<Claims, &'static str> {
        let subject = self.subject.ok_or("Subject is required")?;
        let token_id = self.token_id.ok_or("Token ID is required")?;
        if self.ttl_seconds <= 0 {
            return Err("TTL must be positive");
        }

        let iat = self.issued_at.unwrap_or_else(Utc::now).timestamp();
        let exp = iat.checked_add(self.ttl_seconds).ok_or("TTL out of range")?;

        Ok(Claims {
            aud: self.issuer.clone(),
            iss: self.issuer,
            sub: subject,
            jti: token_id,
            iat,
            exp,
        })
    }
}
