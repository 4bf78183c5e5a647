// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification against the identity provider's signing keys.
//!
//! ## Checks
//!
//! 1. Header `alg` must be on the configured asymmetric allow-list
//! 2. Header must carry a `kid`
//! 3. `exp` is compared to the clock before any key lookup, so an expired
//!    token is reported as expired whatever its signature
//! 4. Signature, `exp`, `nbf`, issuer and audience are validated with the
//!    key published under `kid`
//!
//! There is no unsigned or development mode.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;

use super::claims::IdentityClaims;
use super::error::AuthError;
use super::jwks::JwksManager;
use crate::config::TokenSettings;

/// Verifies bearer tokens. Cheap to clone; clones share the key cache.
#[derive(Clone)]
pub struct TokenVerifier {
    jwks: JwksManager,
    issuer: Option<String>,
    audience: Option<String>,
    allowed_algorithms: Vec<Algorithm>,
    leeway: u64,
}

/// Only the expiry is read before the signature is checked.
#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

impl TokenVerifier {
    pub fn new(jwks: JwksManager, settings: &TokenSettings) -> Self {
        Self {
            jwks,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            allowed_algorithms: settings.allowed_algorithms.clone(),
            leeway: settings.clock_skew_secs,
        }
    }

    pub fn jwks(&self) -> &JwksManager {
        &self.jwks
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ExpiredToken`] when `exp` (plus leeway) has passed
    /// - [`AuthError::KeySourceUnavailable`] when the key set cannot be fetched
    /// - [`AuthError::InvalidToken`] for every other failure
    pub async fn verify(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "Malformed token header");
            AuthError::InvalidToken
        })?;

        if !self.allowed_algorithms.contains(&header.alg) {
            tracing::warn!(alg = ?header.alg, "Token signed with a disallowed algorithm");
            return Err(AuthError::InvalidToken);
        }

        let kid = header.kid.as_deref().ok_or_else(|| {
            tracing::debug!("Token header has no kid");
            AuthError::InvalidToken
        })?;

        self.reject_expired(token)?;

        let key = self.jwks.get_decoding_key(kid, header.alg).await?;

        let data = decode::<IdentityClaims>(token, &key, &self.validation(header.alg)).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                kind => {
                    tracing::debug!(kind = ?kind, "Token rejected");
                    AuthError::InvalidToken
                }
            },
        )?;

        Ok(data.claims)
    }

    /// Reject on `exp` alone. Never accepts a token.
    fn reject_expired(&self, token: &str) -> Result<(), AuthError> {
        let unverified = jsonwebtoken::dangerous::insecure_decode::<ExpiryClaim>(token)
            .map_err(|_| AuthError::InvalidToken)?;
        let now = chrono::Utc::now().timestamp();
        let leeway = i64::try_from(self.leeway).unwrap_or(i64::MAX);
        if unverified.claims.exp.saturating_add(leeway) < now {
            return Err(AuthError::ExpiredToken);
        }
        Ok(())
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];
        validation.leeway = self.leeway;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        validation
    }
}
