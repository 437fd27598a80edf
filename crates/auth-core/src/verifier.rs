//! RS256 OIDC bearer-token verification against a cached JWKS.
//!
//! Claim names are configurable - `user_id_claim`/`username_claim` - since
//! identity providers disagree on which claim carries the stable subject
//! identifier. Claims are read directly off the decoded JSON rather than a
//! fixed struct, since the provider's claim set is otherwise unconstrained.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation, errors::ErrorKind};
use karto_errors::{AppError, AppResult};
use serde_json::Value;

use crate::jwks::JwksCache;

#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub subject: String,
    pub username: Option<String>,
    pub raw: Value,
}

pub struct OidcVerifier {
    jwks: Arc<JwksCache>,
    issuer: String,
    audience: String,
    user_id_claim: String,
    username_claim: String,
    leeway_seconds: u64,
}

impl OidcVerifier {
    pub fn new(
        jwks: Arc<JwksCache>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        user_id_claim: impl Into<String>,
        username_claim: impl Into<String>,
    ) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: audience.into(),
            user_id_claim: user_id_claim.into(),
            username_claim: username_claim.into(),
            leeway_seconds: 30,
        }
    }

    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    pub async fn verify(&self, token: &str) -> AppResult<VerifiedClaims> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| AppError::unauthenticated("malformed token header"))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::unauthenticated("token header missing kid"))?;
        let key = self.jwks.get(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = self.leeway_seconds;

        let data = jsonwebtoken::decode::<Value>(token, &key, &validation)
            .map_err(|e| AppError::unauthenticated(classify(&e)))?;

        let claims = data.claims;
        let subject = claims
            .get(&self.user_id_claim)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::unauthenticated(format!("token missing '{}' claim", self.user_id_claim))
            })?
            .to_string();
        let username = claims
            .get(&self.username_claim)
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(VerifiedClaims {
            subject,
            username,
            raw: claims,
        })
    }
}

fn classify(err: &jsonwebtoken::errors::Error) -> &'static str {
    match err.kind() {
        ErrorKind::ExpiredSignature => "token expired",
        ErrorKind::InvalidIssuer => "invalid issuer",
        ErrorKind::InvalidAudience => "invalid audience",
        ErrorKind::InvalidSignature => "invalid signature",
        ErrorKind::ImmatureSignature => "token not yet valid",
        _ => "malformed token",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_expiry_to_stable_message() {
        use jsonwebtoken::errors::{Error, ErrorKind};
        let err: Error = ErrorKind::ExpiredSignature.into();
        assert_eq!(classify(&err), "token expired");
    }
}
