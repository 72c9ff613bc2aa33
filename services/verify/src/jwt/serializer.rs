//! Compact JWS encoding, signing and verification.

use crate::error::TokenError;
use crate::jwt::claims::Claims;
use crate::kms::TokenSigner;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Header, Validation};

/// Compact JWS serialization of verification token claims.
///
/// Signing goes through a [`TokenSigner`] rather than a local
/// `EncodingKey`, so the private key never has to leave the key manager.
pub struct JwtSerializer;

impl JwtSerializer {
    /// Encode header and claims and have `signer` sign the result.
    pub async fn sign(claims: &Claims, signer: &dyn TokenSigner) -> Result<String, TokenError> {
        let mut header = Header::new(signer.algorithm());
        header.kid = Some(signer.key_id().to_string());

        let signing_input = Self::signing_input(&header, claims)?;
        let signature = signer.sign(signing_input.as_bytes()).await?;

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// `base64url(header) "." base64url(claims)`
    pub fn signing_input(header: &Header, claims: &Claims) -> Result<String, TokenError> {
        let header_json = serde_json::to_vec(header)?;
        let claims_json = serde_json::to_vec(claims)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        ))
    }

    /// Verify an ES256 token against an uncompressed SEC1 public key.
    pub fn verify(token: &str, public_key: &[u8], issuer: &str) -> Result<Claims, TokenError> {
        let key = DecodingKey::from_ec_der(public_key);
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let token_data = decode::<Claims>(token, &key, &validation)?;
        Ok(token_data.claims)
    }

    /// Decode the claims without checking the signature.
    pub fn deserialize_unverified(token: &str) -> Result<Claims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::JwtDecoding("Invalid token format".to_string()));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|e| TokenError::JwtDecoding(e.to_string()))?;

        serde_json::from_slice(&payload).map_err(|e| TokenError::JwtDecoding(e.to_string()))
    }
}
