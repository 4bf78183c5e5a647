// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The reconciled user attached to each authenticated request.
//!
//! Use the `Auth` extractor in handlers:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is CurrentUser
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use utoipa::ToSchema;

use super::{AuthError, Role};
use crate::storage::StoredUser;

/// Identity of the caller, built from the local user row after
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// Local user id
    pub id: String,
    /// Identity provider subject
    pub subject_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<Role>,
    pub is_active: bool,
}

impl CurrentUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Holds a role that may manage teams it is not a member of.
    pub fn is_elevated(&self) -> bool {
        self.roles.iter().any(Role::is_elevated)
    }
}

impl From<&StoredUser> for CurrentUser {
    fn from(user: &StoredUser) -> Self {
        Self {
            id: user.id.clone(),
            subject_id: user.subject_id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            roles: user.roles.clone(),
            is_active: user.is_active,
        }
    }
}

/// Extractor for the authenticated caller.
///
/// Reads the [`CurrentUser`] placed in the request extensions by the access
/// guard. It never looks at the `Authorization` header itself, so a handler
/// mounted without a guard cannot be reached with a raw token.
pub struct Auth(pub CurrentUser);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .map(Auth)
            .ok_or(AuthError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn user(roles: Vec<Role>) -> CurrentUser {
        CurrentUser {
            id: "u-1".into(),
            subject_id: "sub-1".into(),
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            roles,
            is_active: true,
        }
    }

    fn parts() -> Parts {
        Request::builder().uri("/test").body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_enriched_request() {
        let mut parts = parts();
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn auth_extractor_ignores_raw_token() {
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer some.jwt.value")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn auth_extractor_reads_extensions() {
        let mut parts = parts();
        parts.extensions.insert(user(vec![Role::Member]));

        let Auth(current) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(current.id, "u-1");
        assert!(current.has_role(Role::Member));
    }

    #[test]
    fn role_helpers() {
        let member = user(vec![Role::Member]);
        assert!(!member.is_elevated());
        assert!(!member.is_admin());
        assert!(member.has_any_role(&Role::ALL));

        let lead = user(vec![Role::TeamLead]);
        assert!(lead.is_elevated());
        assert!(!lead.has_any_role(&[Role::Admin]));
    }
}
