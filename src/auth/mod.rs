// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bridges Keycloak-issued bearer tokens to local users and per-route access
//! decisions.
//!
//! ## Auth Flow
//!
//! 1. The frontend authenticates the user against Keycloak
//! 2. The frontend sends `Authorization: Bearer <access token>`
//! 3. This server:
//!    - Fetches the realm JWKS and caches it per key id
//!    - Verifies signature, algorithm, expiry, not-before, issuer, audience
//!    - Normalizes claims (`sub`, email, names, realm and client roles)
//!    - Creates or updates the local user row
//!    - Evaluates the route's [`AccessPolicy`]
//!
//! ## Security
//!
//! - Only asymmetric algorithms from the configured allow-list are accepted
//! - There is no unsigned or development mode
//! - Handlers see identity only through the [`Auth`] extractor
//! - Deactivated users are refused even with a valid token

pub mod claims;
pub mod error;
pub mod identity;
pub mod jwks;
pub mod middleware;
pub mod policy;
pub mod reconcile;
pub mod roles;
pub mod store;
pub mod verifier;

pub use claims::{IdentityClaims, NormalizedIdentity};
pub use error::AuthError;
pub use identity::{Auth, CurrentUser};
pub use jwks::JwksManager;
pub use middleware::with_policy;
pub use policy::{AccessPolicy, AuthorizationDecision};
pub use reconcile::{ReconcileAction, ReconcileConfig, Reconciliation, UserReconciler};
pub use roles::{describe as describe_roles, Role};
pub use store::IdentityStore;
pub use verifier::TokenVerifier;
