// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// Every variant maps to a stable `error_code` that clients can match on.
/// Token problems of any kind collapse to 401; only an unmet access
/// requirement produces 403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token is malformed, badly signed, uses a disallowed algorithm,
    /// is not yet valid, or was issued for another issuer/audience
    InvalidToken,
    /// Token `exp` is in the past
    ExpiredToken,
    /// Signing keys could not be fetched from the identity provider
    KeySourceUnavailable(String),
    /// Token is valid but the local account is deactivated
    UserInactive,
    /// Endpoint requires an identity and none was presented
    Unauthenticated,
    /// Identity present but the endpoint requirement is not met
    Forbidden(String),
    /// Storage failure during the named operation
    PersistenceError(&'static str),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::KeySourceUnavailable(_) => "key_source_unavailable",
            AuthError::UserInactive => "user_inactive",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::PersistenceError(_) => "persistence_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::KeySourceUnavailable(_)
            | AuthError::UserInactive
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::PersistenceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller.
    fn public_message(&self) -> String {
        match self {
            // Key fetch and storage details stay in the logs.
            AuthError::KeySourceUnavailable(_) => "Unable to verify token".to_string(),
            AuthError::PersistenceError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Token is invalid"),
            AuthError::ExpiredToken => write!(f, "Token has expired"),
            AuthError::KeySourceUnavailable(msg) => {
                write!(f, "Signing keys unavailable: {msg}")
            }
            AuthError::UserInactive => write!(f, "User account is inactive"),
            AuthError::Unauthenticated => write!(f, "Authentication is required"),
            AuthError::Forbidden(reason) => write!(f, "Access denied: {reason}"),
            AuthError::PersistenceError(op) => write!(f, "Storage failure during {op}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::PersistenceError(op) = &self {
            tracing::error!(operation = *op, "Persistence failure in auth pipeline");
        }
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn token_failures_return_401() {
        for err in [
            AuthError::InvalidToken,
            AuthError::ExpiredToken,
            AuthError::KeySourceUnavailable("timeout".into()),
            AuthError::UserInactive,
            AuthError::Unauthenticated,
        ] {
            assert_eq!(err.clone().into_response().status(), StatusCode::UNAUTHORIZED);
        }

        let body = body_json(AuthError::ExpiredToken.into_response()).await;
        assert_eq!(body["error_code"], "expired_token");
    }

    #[tokio::test]
    async fn forbidden_returns_403_with_reason() {
        let response = AuthError::Forbidden("requires one of: admin".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error_code"], "forbidden");
        assert_eq!(body["error"], "Access denied: requires one of: admin");
    }

    #[tokio::test]
    async fn internal_details_are_not_exposed() {
        let response = AuthError::PersistenceError("upsert_user").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");

        let body = body_json(AuthError::KeySourceUnavailable("dns".into()).into_response()).await;
        assert_eq!(body["error"], "Unable to verify token");
        assert_eq!(body["error_code"], "key_source_unavailable");
    }
}
