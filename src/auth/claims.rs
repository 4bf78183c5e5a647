// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the normalized identity derived from them.

use std::collections::HashMap;

use serde::Deserialize;

use super::roles::{normalize_roles, Role};
use crate::providers::UserInfo;

/// Claims carried by a Keycloak access token.
///
/// Only the fields the dashboard reads are declared; everything else in the
/// payload is ignored during deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// Subject - the federation-stable user identifier
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,

    /// Whether the provider verified ownership of `email`
    #[serde(default)]
    pub email_verified: Option<bool>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    /// Issued at timestamp
    #[serde(default)]
    pub iat: Option<i64>,

    /// Expiration timestamp
    pub exp: i64,

    /// Not before timestamp
    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub iss: Option<String>,

    /// Realm-wide roles
    #[serde(default)]
    pub realm_access: Option<RoleClaim>,

    /// Per-client roles keyed by client id
    #[serde(default)]
    pub resource_access: HashMap<String, RoleClaim>,
}

/// `{ "roles": [...] }` object used by both role scopes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleClaim {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Identity record produced from verified claims.
///
/// Names are never absent: missing claims become empty strings. Email is
/// trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIdentity {
    pub subject_id: String,
    pub email: String,
    /// Absent claims count as unverified.
    pub email_verified: bool,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<Role>,
}

impl NormalizedIdentity {
    /// Normalize verified claims.
    ///
    /// Roles are the union of the realm roles and, when `client_id` is given,
    /// that client's roles. Unknown role names are dropped.
    pub fn from_claims(claims: &IdentityClaims, client_id: Option<&str>) -> Self {
        let realm_roles = claims
            .realm_access
            .iter()
            .flat_map(|access| access.roles.iter());
        let client_roles = client_id
            .and_then(|id| claims.resource_access.get(id))
            .into_iter()
            .flat_map(|access| access.roles.iter());

        let roles = realm_roles
            .chain(client_roles)
            .filter_map(|name| name.parse::<Role>().ok())
            .collect();

        Self {
            subject_id: claims.sub.clone(),
            email: normalize_email(claims.email.as_deref()),
            email_verified: claims.email_verified.unwrap_or(false),
            first_name: claims.given_name.clone().unwrap_or_default(),
            last_name: claims.family_name.clone().unwrap_or_default(),
            roles: normalize_roles(roles),
        }
    }

    /// Fill empty profile fields from a userinfo response.
    ///
    /// Fields already present in the token win; roles are never taken from
    /// userinfo. The verification flag follows whichever source supplied the
    /// email.
    pub fn fill_profile(&mut self, info: UserInfo) {
        if self.email.is_empty() {
            self.email = normalize_email(info.email.as_deref());
            self.email_verified = info.email_verified.unwrap_or(false);
        }
        if self.first_name.is_empty() {
            self.first_name = info.given_name.unwrap_or_default();
        }
        if self.last_name.is_empty() {
            self.last_name = info.family_name.unwrap_or_default();
        }
    }
}

fn normalize_email(email: Option<&str>) -> String {
    email.map(|e| e.trim().to_lowercase()).unwrap_or_default()
}
