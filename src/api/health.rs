// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Auth subsystem health with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthHealthResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub auth: AuthHealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthHealthChecks {
    /// Identity provider discovery document reachable.
    pub keycloak: bool,
    /// Signing keys cached, or fetchable now.
    pub signing_keys: bool,
    /// Database answers a read transaction.
    pub database: bool,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Auth health endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/auth/health",
    tag = "Health",
    responses(
        (status = 200, description = "Auth subsystem is healthy", body = AuthHealthResponse),
        (status = 503, description = "Auth subsystem is degraded", body = AuthHealthResponse)
    )
)]
pub async fn auth_health(State(state): State<AppState>) -> (StatusCode, Json<AuthHealthResponse>) {
    let keycloak = match state.keycloak.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Keycloak health check failed");
            false
        }
    };
    let jwks = state.verifier.jwks();
    let signing_keys = jwks.is_cached().await
        || match jwks.refresh().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Signing key health check failed");
                false
            }
        };
    let database = match state.db.ping() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    let all_ok = keycloak && signing_keys && database;
    let response = AuthHealthResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        auth: AuthHealthChecks {
            keycloak,
            signing_keys,
            database,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use `/auth/health` for that.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
