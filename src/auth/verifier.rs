// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token verification.
//!
//! The gate never checks signatures itself. A [`TokenVerifier`] turns a raw
//! bearer token into validated [`TokenClaims`] or an [`AuthError`]; the
//! pipeline treats every error as "no principal".
//!
//! ## Verifiers
//!
//! - [`JwksVerifier`]: asymmetric keys from the provider's JWKS endpoint
//! - [`SharedSecretVerifier`]: HS256 with a shared secret
//! - `InsecureVerifier` (`dev` feature only): structure and expiry checks,
//!   no signature verification

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

use super::claims::TokenClaims;
use super::error::AuthError;
use super::jwks::JwksManager;

/// Clock skew tolerance (60 seconds).
pub const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Validates a bearer token and returns its claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Issuer and audience expectations shared by all verifiers.
#[derive(Debug, Clone, Default)]
pub struct ClaimChecks {
    /// Expected `iss`
    pub issuer: Option<String>,
    /// Expected `aud`; unchecked when absent
    pub audience: Option<String>,
}

impl ClaimChecks {
    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = self.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        validation
    }
}

/// Verifies tokens against the provider's published key set.
pub struct JwksVerifier {
    jwks: JwksManager,
    checks: ClaimChecks,
}

impl JwksVerifier {
    pub fn new(jwks: JwksManager, checks: ClaimChecks) -> Self {
        Self { jwks, checks }
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

        let (decoding_key, algorithm) = if let Some(kid) = &header.kid {
            self.jwks.get_decoding_key(kid).await?
        } else {
            self.jwks.get_any_decoding_key().await?
        };

        let validation = self.checks.validation(algorithm);
        let token_data = decode::<TokenClaims>(token, &decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    fn name(&self) -> &'static str {
        "jwks"
    }
}

/// Verifies HS256 tokens signed with a shared secret.
pub struct SharedSecretVerifier {
    key: DecodingKey,
    checks: ClaimChecks,
}

impl SharedSecretVerifier {
    pub fn new(secret: &[u8], checks: ClaimChecks) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            checks,
        }
    }
}

#[async_trait]
impl TokenVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let validation = self.checks.validation(Algorithm::HS256);
        let token_data = decode::<TokenClaims>(token, &self.key, &validation)?;
        Ok(token_data.claims)
    }

    fn name(&self) -> &'static str {
        "shared-secret"
    }
}

/// Development verifier: decodes without checking the signature.
///
/// WARNING: This should only be used in development environments.
#[cfg(feature = "dev")]
pub struct InsecureVerifier;

#[cfg(feature = "dev")]
#[async_trait]
impl TokenVerifier for InsecureVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let token_data = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token)
            .map_err(|_| AuthError::MalformedToken)?;
        let claims = token_data.claims;

        let now = chrono::Utc::now().timestamp();
        if let Some(exp) = claims.get("exp").and_then(serde_json::Value::as_i64) {
            if exp < now - CLOCK_SKEW_LEEWAY as i64 {
                return Err(AuthError::TokenExpired);
            }
        }

        Ok(claims)
    }

    fn name(&self) -> &'static str {
        "insecure-dev"
    }
}
