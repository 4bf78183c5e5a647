// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behavior
//!
//! - Keys are looked up by `kid` and cached with a configurable TTL
//! - A `kid` missing from a fresh cache triggers exactly one refetch, so a
//!   key rotated in at the identity provider is picked up without restart
//! - Refetches for unknown `kid`s are rate limited to one per
//!   [`MIN_REFETCH_INTERVAL`]
//! - A failed fetch never falls back to an expired key set
//! - Fetches are single-flight; lookups of cached keys never wait on one
//!
//! ## Usage
//!
//! Built once in `main.rs` from [`crate::config::TokenSettings`] and shared
//! through the token verifier in `AppState`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};

use super::error::AuthError;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Minimum spacing between refetches caused by an unknown `kid`.
pub const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// JWKS manager with caching.
#[derive(Clone)]
pub struct JwksManager {
    /// Key set endpoint
    jwks_url: String,
    cache_ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
    /// Held for the duration of a fetch
    fetch_gate: Arc<Mutex<()>>,
    /// HTTP client; carries the configured request timeout
    client: reqwest::Client,
}

impl JwksManager {
    /// Create a new JWKS manager using `client` for every fetch.
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
            fetch_gate: Arc::new(Mutex::new(())),
            client,
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Seed the cache with a key set, as if it had just been fetched.
    pub async fn prime(&self, jwks: JwkSet) {
        self.store(jwks).await;
    }

    async fn store(&self, jwks: JwkSet) {
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            jwks,
            fetched_at: Instant::now(),
        });
    }

    /// Resolve the verification key for `kid`, checked against `algorithm`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeySourceUnavailable`] when the key set cannot be fetched
    /// - [`AuthError::InvalidToken`] when no usable key carries `kid`
    pub async fn get_decoding_key(
        &self,
        kid: &str,
        algorithm: Algorithm,
    ) -> Result<DecodingKey, AuthError> {
        if let Some(jwk) = self.cached_key(kid).await {
            return jwk_to_decoding_key(&jwk, algorithm);
        }

        let jwk = self.refetch_for(kid).await?.ok_or_else(|| {
            tracing::warn!(kid, "No signing key matches token kid");
            AuthError::InvalidToken
        })?;
        jwk_to_decoding_key(&jwk, algorithm)
    }

    /// Look up `kid` in a non-expired cache.
    async fn cached_key(&self, kid: &str) -> Option<Jwk> {
        let cache = self.cache.read().await;
        let entry = cache.as_ref()?;
        if entry.fetched_at.elapsed() >= self.cache_ttl {
            return None;
        }
        entry.jwks.find(kid).cloned()
    }

    /// Refresh the cache for a lookup miss and return the key for `kid`.
    ///
    /// Concurrent misses queue on the fetch gate and reuse the set the first
    /// one stored. The cache lock is only taken to read and swap the entry.
    async fn refetch_for(&self, kid: &str) -> Result<Option<Jwk>, AuthError> {
        let _gate = self.fetch_gate.lock().await;

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                let age = entry.fetched_at.elapsed();
                if age < self.cache_ttl {
                    if let Some(jwk) = entry.jwks.find(kid) {
                        return Ok(Some(jwk.clone()));
                    }
                    if age < MIN_REFETCH_INTERVAL {
                        return Ok(None);
                    }
                }
            }
        }

        let jwks = self.fetch_jwks().await?;
        let jwk = jwks.find(kid).cloned();
        self.store(jwks).await;
        Ok(jwk)
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| key_source_error(&self.jwks_url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(key_source_error(
                &self.jwks_url,
                format!("HTTP {} from JWKS endpoint", response.status()),
            ));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| key_source_error(&self.jwks_url, e.to_string()))?;

        tracing::debug!(keys = jwks.keys.len(), "Fetched signing key set");
        Ok(jwks)
    }

    /// Fetch the key set now and replace the cache.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _gate = self.fetch_gate.lock().await;
        let jwks = self.fetch_jwks().await?;
        self.store(jwks).await;
        Ok(())
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }
}

fn key_source_error(url: &str, reason: String) -> AuthError {
    tracing::warn!(url, error = %reason, "Signing key fetch failed");
    AuthError::KeySourceUnavailable(reason)
}

/// Convert a JWK to a DecodingKey usable with `algorithm`.
///
/// The key type must belong to the algorithm family, an `alg` published on
/// the key must equal `algorithm`, and encryption keys are never used.
fn jwk_to_decoding_key(jwk: &Jwk, algorithm: Algorithm) -> Result<DecodingKey, AuthError> {
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return Err(AuthError::InvalidToken);
    }
    if let Some(key_alg) = jwk.common.key_algorithm {
        if signing_algorithm(key_alg) != Some(algorithm) {
            tracing::warn!(key_alg = ?key_alg, token_alg = ?algorithm, "Token alg does not match key");
            return Err(AuthError::InvalidToken);
        }
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa)
            if matches!(
                algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ) =>
        {
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|e| {
                tracing::warn!(error = %e, "Malformed RSA key in key set");
                AuthError::InvalidToken
            })
        }
        AlgorithmParameters::EllipticCurve(ec)
            if matches!(algorithm, Algorithm::ES256 | Algorithm::ES384) =>
        {
            DecodingKey::from_ec_components(&ec.x, &ec.y).map_err(|e| {
                tracing::warn!(error = %e, "Malformed EC key in key set");
                AuthError::InvalidToken
            })
        }
        _ => Err(AuthError::InvalidToken),
    }
}

/// The signing algorithm a JWK `alg` names, if any.
fn signing_algorithm(key_alg: KeyAlgorithm) -> Option<Algorithm> {
    match key_alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        _ => None,
    }
}
