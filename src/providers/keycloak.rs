// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keycloak client: userinfo, discovery health and realm role assignment.
//!
//! Constructed once at startup and shared through `AppState`. Every call goes
//! through the injected `reqwest::Client`, which carries the configured
//! timeout.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::Role;
use crate::config::KeycloakSettings;

#[derive(Debug, thiserror::Error)]
pub enum KeycloakError {
    #[error("Keycloak admin access is not configured: {0}")]
    NotConfigured(String),

    #[error("Keycloak request failed: {0}")]
    Request(String),

    #[error("Keycloak returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Keycloak response was invalid: {0}")]
    InvalidResponse(String),
}

/// Profile returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct KeycloakClient {
    base_url: String,
    realm: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    http: Client,
}

impl KeycloakClient {
    pub fn new(settings: &KeycloakSettings, http: Client) -> Self {
        Self {
            base_url: settings.base_url.as_str().trim_end_matches('/').to_string(),
            realm: settings.realm.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            http,
        }
    }

    /// `{base}/realms/{realm}`.
    pub fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.base_url, self.realm)
    }

    fn admin_url(&self) -> String {
        format!("{}/admin/realms/{}", self.base_url, self.realm)
    }

    /// Fetch the caller's profile using their own access token.
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo, KeycloakError> {
        let url = format!("{}/protocol/openid-connect/userinfo", self.realm_url());
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| KeycloakError::Request(format!("GET userinfo failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(KeycloakError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| KeycloakError::InvalidResponse(format!("userinfo: {e}")))
    }

    /// Check that the realm's discovery document is reachable.
    pub async fn health_check(&self) -> Result<(), KeycloakError> {
        let url = format!("{}/.well-known/openid-configuration", self.realm_url());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| KeycloakError::Request(format!("GET discovery failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(KeycloakError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            })
        }
    }

    /// Grant a realm role to the user with identity-provider id `subject_id`.
    pub async fn assign_realm_role(&self, subject_id: &str, role: Role) -> Result<(), KeycloakError> {
        let token = self.admin_token().await?;

        let role_url = format!("{}/roles/{}", self.admin_url(), role.as_str());
        let response = self
            .http
            .get(&role_url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| KeycloakError::Request(format!("GET role failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(KeycloakError::Status { status, body });
        }
        let representation: Value = response
            .json()
            .await
            .map_err(|e| KeycloakError::InvalidResponse(format!("role representation: {e}")))?;

        let mapping_url = format!(
            "{}/users/{}/role-mappings/realm",
            self.admin_url(),
            subject_id
        );
        let response = self
            .http
            .post(&mapping_url)
            .bearer_auth(&token)
            .json(&[representation])
            .send()
            .await
            .map_err(|e| KeycloakError::Request(format!("POST role mapping failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(KeycloakError::Status { status, body });
        }

        tracing::info!(subject_id, role = %role, "Assigned realm role");
        Ok(())
    }

    /// Like [`Self::assign_realm_role`], logging failures instead of
    /// returning them.
    pub async fn assign_realm_role_best_effort(&self, subject_id: &str, role: Role) {
        if let Err(e) = self.assign_realm_role(subject_id, role).await {
            tracing::warn!(subject_id, role = %role, error = %e, "Realm role assignment failed");
        }
    }

    async fn admin_token(&self) -> Result<String, KeycloakError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(KeycloakError::NotConfigured(
                "client id and secret are required".to_string(),
            ));
        };

        let mut form = HashMap::new();
        form.insert("grant_type", "client_credentials");
        form.insert("client_id", client_id.as_str());
        form.insert("client_secret", client_secret.as_str());

        let response = self
            .http
            .post(format!("{}/protocol/openid-connect/token", self.realm_url()))
            .form(&form)
            .send()
            .await
            .map_err(|e| KeycloakError::Request(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(KeycloakError::Status { status, body });
        }

        let token: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| KeycloakError::InvalidResponse(format!("token response: {e}")))?;

        if token.access_token.trim().is_empty() {
            return Err(KeycloakError::InvalidResponse(
                "token response did not include access_token".to_string(),
            ));
        }
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Form, Path},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::test_support::{dead_url, serve};

    const REALM: &str = "team-dashboard";

    fn client(base: &str, secret: Option<&str>) -> KeycloakClient {
        let settings = KeycloakSettings {
            base_url: Url::parse(base).unwrap(),
            realm: REALM.to_string(),
            client_id: Some("dashboard-backend".to_string()),
            client_secret: secret.map(str::to_string),
        };
        KeycloakClient::new(&settings, Client::new())
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn userinfo_returns_profile() {
        let app = Router::new().route(
            "/realms/team-dashboard/protocol/openid-connect/userinfo",
            get(|headers: HeaderMap| async move {
                if bearer(&headers) != "Bearer user-token" {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                Ok(Json(json!({
                    "sub": "kc-1",
                    "email": "ada@example.com",
                    "given_name": "Ada",
                })))
            }),
        );
        let base = serve(app).await;
        let keycloak = client(&base, None);

        let info = keycloak.userinfo("user-token").await.unwrap();
        assert_eq!(info.sub, "kc-1");
        assert_eq!(info.email.as_deref(), Some("ada@example.com"));
        assert!(info.family_name.is_none());

        let err = keycloak.userinfo("other-token").await.unwrap_err();
        assert!(matches!(err, KeycloakError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn health_check_reads_discovery_document() {
        let app = Router::new().route(
            "/realms/team-dashboard/.well-known/openid-configuration",
            get(|| async { Json(json!({ "issuer": "http://kc/realms/team-dashboard" })) }),
        );
        let base = serve(app).await;
        assert!(client(&base, None).health_check().await.is_ok());

        let down = dead_url().await;
        let down = down.trim_end_matches("/certs");
        let err = client(down, None).health_check().await.unwrap_err();
        assert!(matches!(err, KeycloakError::Request(_)));
    }

    #[tokio::test]
    async fn assign_realm_role_posts_role_representation() {
        let mapped: Arc<Mutex<Vec<(String, Value)>>> = Arc::default();
        let recorder = mapped.clone();

        let app = Router::new()
            .route(
                "/realms/team-dashboard/protocol/openid-connect/token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    assert_eq!(form.get("grant_type").map(String::as_str), Some("client_credentials"));
                    assert_eq!(form.get("client_secret").map(String::as_str), Some("s3cret"));
                    Json(json!({ "access_token": "admin-token" }))
                }),
            )
            .route(
                "/admin/realms/team-dashboard/roles/{role}",
                get(|Path(role): Path<String>, headers: HeaderMap| async move {
                    assert_eq!(bearer(&headers), "Bearer admin-token");
                    Json(json!({ "id": format!("id-{role}"), "name": role }))
                }),
            )
            .route(
                "/admin/realms/team-dashboard/users/{sub}/role-mappings/realm",
                post(move |Path(sub): Path<String>, Json(body): Json<Value>| {
                    let recorder = recorder.clone();
                    async move {
                        recorder.lock().unwrap().push((sub, body));
                        StatusCode::NO_CONTENT
                    }
                }),
            );
        let base = serve(app).await;

        client(&base, Some("s3cret"))
            .assign_realm_role("kc-7", Role::TeamLead)
            .await
            .unwrap();

        let mapped = mapped.lock().unwrap();
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].0, "kc-7");
        assert_eq!(mapped[0].1, json!([{ "id": "id-team-lead", "name": "team-lead" }]));
    }

    #[tokio::test]
    async fn assign_realm_role_requires_credentials() {
        let base = dead_url().await;
        let err = client(&base, None)
            .assign_realm_role("kc-7", Role::Member)
            .await
            .unwrap_err();
        assert!(matches!(err, KeycloakError::NotConfigured(_)));

        // Swallowed, not propagated.
        client(&base, Some("s3cret"))
            .assign_realm_role_best_effort("kc-7", Role::Member)
            .await;
    }
}
