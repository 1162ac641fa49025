// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behaviour
//!
//! - Keys are cached with a configurable TTL
//! - Expired keys are served while a background task refreshes them
//! - A token signed with an unknown `kid` forces a refresh (key rotation),
//!   at most once per [`MIN_REFRESH_INTERVAL`]
//! - Failed fetches count as attempts, so a down provider is retried at the
//!   same pace and never once per request
//!
//! Keycloak publishes its keys at `<issuer>/protocol/openid-connect/certs`;
//! [`keycloak_jwks_url`] derives that URL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::error::AuthError;

/// Default JWKS cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Minimum time between two fetches, successful or not.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP timeout for a single JWKS fetch. Kept below the pipeline's
/// validation timeout so a cold fetch can finish inside one request.
const FETCH_TIMEOUT: Duration = Duration::from_millis(1500);

/// Keycloak certs endpoint, relative to the realm issuer.
const KEYCLOAK_CERTS_PATH: &str = "protocol/openid-connect/certs";

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    /// Start of the last fetch, whatever its outcome
    last_attempt: Option<Instant>,
}

/// JWKS manager with caching.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS URL
    jwks_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    /// Cached JWKS
    state: Arc<RwLock<CacheState>>,
    /// Serializes fetches
    fetch_lock: Arc<Mutex<()>>,
    /// HTTP client
    client: reqwest::Client,
}

impl JwksManager {
    /// Create a new JWKS manager for the given endpoint.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::InternalError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            min_refresh_interval: MIN_REFRESH_INTERVAL,
            state: Arc::new(RwLock::new(CacheState::default())),
            fetch_lock: Arc::new(Mutex::new(())),
            client,
        })
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Cached JWKS. Only a cold cache waits on the network.
    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        let stale = {
            let state = self.state.read().await;
            match &state.entry {
                Some(entry) if entry.fetched_at.elapsed() < self.cache_ttl => {
                    return Ok(entry.jwks.clone());
                }
                Some(entry) => Some(entry.jwks.clone()),
                None => None,
            }
        };

        if let Some(jwks) = stale {
            self.spawn_refresh().await;
            return Ok(jwks);
        }

        match self.refresh_if_due().await? {
            Some(jwks) => Ok(jwks),
            None => self.cached().await.ok_or_else(|| {
                AuthError::JwksFetchError("JWKS endpoint unavailable, retry pending".to_string())
            }),
        }
    }

    async fn cached(&self) -> Option<JwkSet> {
        let state = self.state.read().await;
        state.entry.as_ref().map(|entry| entry.jwks.clone())
    }

    async fn refresh_due(&self) -> bool {
        let state = self.state.read().await;
        state
            .last_attempt
            .is_none_or(|at| at.elapsed() >= self.min_refresh_interval)
    }

    /// Refresh in the background while callers keep using the stale keys.
    async fn spawn_refresh(&self) {
        if !self.refresh_due().await {
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.refresh_if_due().await {
                tracing::warn!(
                    jwks_url = %manager.jwks_url,
                    error = %e,
                    "JWKS refresh failed, using stale keys"
                );
            }
        });
    }

    /// Fetch the key set unless another fetch started less than
    /// `min_refresh_interval` ago. `Ok(None)` means the fetch was skipped.
    async fn refresh_if_due(&self) -> Result<Option<JwkSet>, AuthError> {
        let _fetching = self.fetch_lock.lock().await;
        if !self.refresh_due().await {
            return Ok(None);
        }
        self.state.write().await.last_attempt = Some(Instant::now());

        let jwks = self.fetch_jwks().await?;
        self.state.write().await.entry = Some(CacheEntry {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(Some(jwks))
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        tracing::debug!(jwks_url = %self.jwks_url, keys = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }

    /// Get a decoding key for the given key ID.
    ///
    /// An unknown `kid` triggers a refresh only when one is due; otherwise
    /// it fails with [`AuthError::NoMatchingKey`] right away.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;
        if let Some(jwk) = find_key(&jwks, kid) {
            return jwk_to_decoding_key(jwk);
        }

        match self.refresh_if_due().await? {
            Some(jwks) => {
                tracing::info!(kid, "Unknown key id, JWKS refreshed");
                let jwk = find_key(&jwks, kid).ok_or(AuthError::NoMatchingKey)?;
                jwk_to_decoding_key(jwk)
            }
            None => {
                tracing::debug!(kid, "Unknown key id, refresh not due");
                Err(AuthError::NoMatchingKey)
            }
        }
    }

    /// Get any valid decoding key (for tokens without kid).
    pub async fn get_any_decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;

        jwks.keys
            .iter()
            .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
            .ok_or(AuthError::NoMatchingKey)
    }

    /// Refresh the JWKS cache if a fetch is due.
    ///
    /// Succeeds without fetching when a recent attempt already produced keys.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        match self.refresh_if_due().await? {
            Some(_) => Ok(()),
            None if self.has_keys().await => Ok(()),
            None => Err(AuthError::JwksFetchError(
                "JWKS endpoint unavailable, retry pending".to_string(),
            )),
        }
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let state = self.state.read().await;
        state
            .entry
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }

    /// Whether any keys, fresh or stale, are available.
    pub async fn has_keys(&self) -> bool {
        self.state.read().await.entry.is_some()
    }

    /// Put `jwks` in the cache as if fetched `age` ago.
    #[cfg(test)]
    async fn seed(&self, jwks: JwkSet, age: Duration) {
        let at = Instant::now().checked_sub(age).unwrap_or_else(Instant::now);
        let mut state = self.state.write().await;
        state.entry = Some(CacheEntry {
            jwks,
            fetched_at: at,
        });
        state.last_attempt = Some(at);
    }
}

/// Keycloak certs URL for a realm issuer.
pub fn keycloak_jwks_url(issuer: &str) -> Result<String, AuthError> {
    let base = if issuer.ends_with('/') {
        issuer.to_string()
    } else {
        format!("{issuer}/")
    };
    let url = Url::parse(&base)
        .and_then(|u| u.join(KEYCLOAK_CERTS_PATH))
        .map_err(|e| AuthError::InternalError(format!("Invalid issuer URL '{issuer}': {e}")))?;
    Ok(url.to_string())
}

fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
}

/// Convert a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| AuthError::InternalError(format!("Failed to create RSA key: {e}")))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                Some(KeyAlgorithm::PS384) => Algorithm::PS384,
                Some(KeyAlgorithm::PS512) => Algorithm::PS512,
                _ => Algorithm::RS256,
            };

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| AuthError::InternalError(format!("Failed to create EC key: {e}")))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };

            Ok((key, alg))
        }
        _ => Err(AuthError::InternalError(
            "Unsupported key type in JWKS".to_string(),
        )),
    }
}
