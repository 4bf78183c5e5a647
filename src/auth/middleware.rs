// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-route access guard.
//!
//! Every route is wrapped with [`with_policy`], which runs the full pipeline
//! before the handler:
//!
//! 1. read the bearer token
//! 2. verify it ([`TokenVerifier`](super::TokenVerifier))
//! 3. normalize claims, filling a missing email from userinfo
//! 4. reconcile the local user
//! 5. resolve the team the request is about
//! 6. evaluate the route's [`AccessPolicy`]
//!
//! On success the [`CurrentUser`] is placed in the request extensions for the
//! [`Auth`](super::Auth) extractor.

use axum::{
    body::Body,
    extract::{RawPathParams, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
    RequestExt,
};
use serde::Deserialize;
use serde_json::json;

use super::claims::NormalizedIdentity;
use super::identity::CurrentUser;
use super::policy::{self, AccessPolicy};
use super::reconcile::UserReconciler;
use super::AuthError;
use crate::activity_log;
use crate::providers::KeycloakError;
use crate::state::AppState;
use crate::storage::{
    ActivityType, MembershipRole, ProjectRepository, StoreError, StoredUser, TeamRepository,
};

/// Largest body buffered while looking for a `teamId` field.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// State handed to [`enforce`]: the application plus the route's policy.
#[derive(Clone)]
pub struct PolicyGuard {
    state: AppState,
    policy: AccessPolicy,
}

impl PolicyGuard {
    pub fn new(state: AppState, policy: AccessPolicy) -> Self {
        Self { state, policy }
    }
}

/// Attach `policy` to every method of `route`.
pub fn with_policy(
    route: MethodRouter<AppState>,
    state: &AppState,
    policy: AccessPolicy,
) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        PolicyGuard::new(state.clone(), policy),
        enforce,
    ))
}

/// Guard middleware.
pub async fn enforce(State(guard): State<PolicyGuard>, request: Request, next: Next) -> Response {
    match admit(&guard, request).await {
        Ok(request) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

async fn admit(guard: &PolicyGuard, request: Request) -> Result<Request, AuthError> {
    if !guard.policy.requires_identity() {
        return Ok(request);
    }

    let token = bearer_token(request.headers())?;
    let user = authenticate(&guard.state, &token).await?;

    let path = request.uri().path().to_string();
    let (mut request, team_id) = if guard.policy.is_team_scoped() {
        resolve_team_id(&guard.state, request).await?
    } else {
        (request, None)
    };

    policy::enforce(
        &guard.policy,
        Some(&user),
        team_id.as_deref(),
        guard.state.db(),
        &path,
    )?;

    request.extensions_mut().insert(user);
    Ok(request)
}

/// Token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated)?;
    let value = header.to_str().map_err(|_| AuthError::InvalidToken)?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() {
                Err(AuthError::InvalidToken)
            } else {
                Ok(token.to_string())
            }
        }
        _ => Err(AuthError::InvalidToken),
    }
}

/// Verify `token` and reconcile the local user it names.
pub async fn authenticate(state: &AppState, token: &str) -> Result<CurrentUser, AuthError> {
    let claims = state.verifier.verify(token).await?;
    let mut identity = NormalizedIdentity::from_claims(&claims, state.client_id.as_deref());

    if identity.email.is_empty() {
        fill_from_userinfo(state, token, &mut identity).await?;
    }

    let reconciliation =
        UserReconciler::new(state.db(), state.reconcile.clone()).reconcile(&identity)?;

    if reconciliation.action.is_created() {
        on_first_login(state, &reconciliation.user);
    }

    Ok(CurrentUser::from(&reconciliation.user))
}

async fn fill_from_userinfo(
    state: &AppState,
    token: &str,
    identity: &mut NormalizedIdentity,
) -> Result<(), AuthError> {
    let info = state.keycloak.userinfo(token).await.map_err(|e| match e {
        KeycloakError::Request(message) => {
            tracing::warn!(error = %message, "Userinfo endpoint unreachable");
            AuthError::KeySourceUnavailable(message)
        }
        other => {
            tracing::warn!(error = %other, "Userinfo rejected token");
            AuthError::InvalidToken
        }
    })?;

    if info.sub != identity.subject_id {
        tracing::warn!(
            token_sub = %identity.subject_id,
            userinfo_sub = %info.sub,
            "Userinfo subject does not match token"
        );
        return Err(AuthError::InvalidToken);
    }

    identity.fill_profile(info);
    if identity.email.is_empty() {
        tracing::warn!(subject_id = %identity.subject_id, "No email in token or userinfo");
        return Err(AuthError::InvalidToken);
    }
    Ok(())
}

/// Provisioning side effects. Failures are logged, never returned.
fn on_first_login(state: &AppState, user: &StoredUser) {
    activity_log!(state.db(), ActivityType::UserProvisioned, user.id);

    let Some(team_name) = state.default_team_name.as_deref() else {
        return;
    };

    match join_default_team(state, user, team_name) {
        Ok(team_id) => {
            let payload = json!({
                "teamId": team_id,
                "userId": user.id,
                "role": MembershipRole::Member,
            });
            activity_log!(
                state.db(),
                ActivityType::TeamMemberAdded,
                user.id,
                team = team_id,
                payload = payload
            );
            tracing::info!(user_id = %user.id, team_id = %team_id, "Joined default team");
        }
        Err(e) => {
            tracing::warn!(
                user_id = %user.id,
                team = team_name,
                error = %e,
                "Failed to join default team"
            );
        }
    }
}

fn join_default_team(
    state: &AppState,
    user: &StoredUser,
    team_name: &str,
) -> Result<String, StoreError> {
    TeamRepository::new(state.db()).ensure_named_member(team_name, &user.id)
}

#[derive(Deserialize)]
struct TeamIdField {
    #[serde(rename = "teamId")]
    team_id: Option<String>,
}

/// Team the request is about: path `team_id`, then the team of path
/// `project_id`, then a `teamId` field in a JSON body.
///
/// The body is buffered and put back so the handler still sees it.
async fn resolve_team_id(
    state: &AppState,
    mut request: Request,
) -> Result<(Request, Option<String>), AuthError> {
    let params = request.extract_parts::<RawPathParams>().await.ok();
    let param = |name: &str| {
        params
            .as_ref()
            .and_then(|p| p.iter().find(|(key, _)| *key == name).map(|(_, v)| v.to_string()))
    };

    if let Some(team_id) = param("team_id") {
        return Ok((request, Some(team_id)));
    }

    if let Some(project_id) = param("project_id") {
        let team_id = ProjectRepository::new(state.db())
            .team_of(&project_id)
            .map_err(|e| {
                tracing::error!(project_id = %project_id, error = %e, "Project lookup failed");
                AuthError::PersistenceError("find_project_team")
            })?;
        return Ok((request, team_id));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, "Request body could not be buffered");
            AuthError::Forbidden("team id is required".to_string())
        })?;
    let team_id = serde_json::from_slice::<TeamIdField>(&bytes)
        .ok()
        .and_then(|body| body.team_id)
        .filter(|id| !id.is_empty());

    Ok((Request::from_parts(parts, Body::from(bytes)), team_id))
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{Method, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{Auth, Role};
    use crate::storage::database::tests::temp_db;
    use crate::storage::{
        ActivityRepository, StoredMembership, StoredProject, StoredTeam, UserRepository,
    };
    use crate::test_support::{
        claims_for, now, serve, sign, sign_with, test_state, test_state_with_keycloak,
        FOREIGN_KEY_PEM, TEST_KID,
    };

    async fn whoami(Auth(user): Auth) -> String {
        user.id
    }

    async fn echo(Auth(_): Auth, body: String) -> String {
        body
    }

    fn app(state: AppState) -> Router {
        let members = AccessPolicy::RequiresTeamMembership;
        Router::new()
            .route("/open", with_policy(get(|| async { "ok" }), &state, AccessPolicy::Public))
            .route(
                "/me",
                with_policy(get(whoami), &state, AccessPolicy::AuthenticatedOnly),
            )
            .route(
                "/manage",
                with_policy(
                    get(whoami),
                    &state,
                    AccessPolicy::any_role(&[Role::Admin, Role::TeamLead]),
                ),
            )
            .route("/teams/{team_id}", with_policy(get(whoami), &state, members.clone()))
            .route(
                "/projects/{project_id}",
                with_policy(get(whoami), &state, members.clone()),
            )
            .route("/projects", with_policy(post(echo), &state, members))
            .with_state(state)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &str,
    ) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn get_as(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, String) {
        call(app, Method::GET, uri, token, "").await
    }

    fn error_code(body: &str) -> String {
        let value: Value = serde_json::from_str(body).unwrap();
        value["error_code"].as_str().unwrap_or_default().to_string()
    }

    fn member_token(sub: &str) -> String {
        sign(&claims_for(sub, &format!("{sub}@example.com"), &["member"]))
    }

    #[tokio::test]
    async fn public_route_needs_no_token() {
        let (db, _dir) = temp_db();
        let app = app(test_state(db).await);
        let (status, body) = get_as(&app, "/open", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_rejected() {
        let (db, _dir) = temp_db();
        let app = app(test_state(db).await);

        let (status, body) = get_as(&app, "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "unauthenticated");

        let request = axum::http::Request::builder()
            .uri("/me")
            .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_provisions_user_once() {
        let (db, _dir) = temp_db();
        let state = test_state(db).await;
        let app = app(state.clone());
        let token = member_token("kc-1");

        let (status, first_id) = get_as(&app, "/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second_id) = get_as(&app, "/me", Some(&token)).await;
        assert_eq!(first_id, second_id);

        let users = UserRepository::new(state.db());
        assert_eq!(users.count().unwrap(), 1);
        let user = users.find_by_subject("kc-1").unwrap().unwrap();
        assert_eq!(user.id, first_id);
        assert_eq!(user.roles, vec![Role::Member]);

        let events = ActivityRepository::new(state.db()).list_recent(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].activity_type, ActivityType::UserProvisioned);
    }

    #[tokio::test]
    async fn token_failures_map_to_error_codes() {
        let (db, _dir) = temp_db();
        let app = app(test_state(db).await);

        let mut expired = claims_for("kc-1", "a@example.com", &["member"]);
        expired["exp"] = json!(now() - 60);
        let (status, body) = get_as(&app, "/me", Some(&sign(&expired))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "expired_token");

        let claims = claims_for("kc-1", "a@example.com", &["member"]);
        let foreign = sign_with(
            &claims,
            FOREIGN_KEY_PEM,
            Some(TEST_KID),
            jsonwebtoken::Algorithm::RS256,
        );
        let (status, body) = get_as(&app, "/me", Some(&foreign)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "invalid_token");
    }

    #[tokio::test]
    async fn role_policy_denies_plain_member() {
        let (db, _dir) = temp_db();
        let app = app(test_state(db).await);

        let (status, body) = get_as(&app, "/manage", Some(&member_token("kc-1"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "forbidden");
        assert!(body.contains("admin, team-lead"));

        let lead = sign(&claims_for("kc-2", "lead@example.com", &["team-lead"]));
        let (status, _) = get_as(&app, "/manage", Some(&lead)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn deactivated_user_is_refused() {
        let (db, _dir) = temp_db();
        let state = test_state(db).await;
        let app = app(state.clone());
        let token = member_token("kc-1");

        let (_, user_id) = get_as(&app, "/me", Some(&token)).await;
        UserRepository::new(state.db()).set_active(&user_id, false).unwrap();

        let (status, body) = get_as(&app, "/me", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "user_inactive");
    }

    #[tokio::test]
    async fn unverified_email_cannot_claim_existing_user() {
        let (db, _dir) = temp_db();
        let state = test_state(db).await;
        let app = app(state.clone());
        let (_, owner_id) = get_as(&app, "/me", Some(&member_token("kc-1"))).await;

        let mut claims = claims_for("kc-2", "kc-1@example.com", &["member"]);
        claims["email_verified"] = Value::Bool(false);
        let (status, body) = get_as(&app, "/me", Some(&sign(&claims))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "forbidden");

        let owner = UserRepository::new(state.db()).get(&owner_id).unwrap().unwrap();
        assert_eq!(owner.subject_id, "kc-1");
    }

    #[tokio::test]
    async fn team_is_resolved_from_path_project_and_body() {
        let (db, _dir) = temp_db();
        let state = test_state(db).await;
        let app = app(state.clone());
        let token = member_token("kc-1");
        let (_, user_id) = get_as(&app, "/me", Some(&token)).await;

        let teams = TeamRepository::new(state.db());
        let team = StoredTeam::new("Platform", None, "founder");
        teams
            .create(&team, &StoredMembership::new(&team.id, "founder", MembershipRole::Lead))
            .unwrap();
        let project = StoredProject::new("Launch", None, &team.id, "founder");
        ProjectRepository::new(state.db()).create(&project).unwrap();

        let team_uri = format!("/teams/{}", team.id);
        let project_uri = format!("/projects/{}", project.id);
        let body = json!({ "teamId": team.id, "title": "Next" }).to_string();

        assert_eq!(get_as(&app, &team_uri, Some(&token)).await.0, StatusCode::FORBIDDEN);
        assert_eq!(get_as(&app, &project_uri, Some(&token)).await.0, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, Method::POST, "/projects", Some(&token), &body).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        teams
            .add_member(&StoredMembership::new(&team.id, &user_id, MembershipRole::Member))
            .unwrap();

        assert_eq!(get_as(&app, &team_uri, Some(&token)).await.0, StatusCode::OK);
        assert_eq!(get_as(&app, &project_uri, Some(&token)).await.0, StatusCode::OK);
        let (status, echoed) = call(&app, Method::POST, "/projects", Some(&token), &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(echoed, body);
    }

    #[tokio::test]
    async fn unresolvable_team_is_forbidden() {
        let (db, _dir) = temp_db();
        let app = app(test_state(db).await);
        let token = member_token("kc-1");

        let (status, body) =
            call(&app, Method::POST, "/projects", Some(&token), r#"{"title":"x"}"#).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("team id is required"));

        let (status, _) = get_as(&app, "/projects/missing", Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_email_is_filled_from_userinfo() {
        let keycloak = Router::new().route(
            "/realms/team-dashboard/protocol/openid-connect/userinfo",
            get(|| async {
                Json(json!({ "sub": "kc-9", "email": "grace@example.com", "given_name": "Grace" }))
            }),
        );
        let base = serve(keycloak).await;
        let (db, _dir) = temp_db();
        let state = test_state_with_keycloak(db, &base).await;
        let app = app(state.clone());

        let mut claims = claims_for("kc-9", "", &["member"]);
        claims.as_object_mut().unwrap().remove("email");
        claims.as_object_mut().unwrap().remove("given_name");
        let (status, _) = get_as(&app, "/me", Some(&sign(&claims))).await;
        assert_eq!(status, StatusCode::OK);

        let user = UserRepository::new(state.db()).find_by_subject("kc-9").unwrap().unwrap();
        assert_eq!(user.email, "grace@example.com");
        assert_eq!(user.first_name, "Grace");
        assert_eq!(user.last_name, "User");

        // Userinfo for another subject is not trusted.
        let mut other = claims_for("kc-10", "", &["member"]);
        other.as_object_mut().unwrap().remove("email");
        let (status, body) = get_as(&app, "/me", Some(&sign(&other))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "invalid_token");
    }

    #[tokio::test]
    async fn unreachable_userinfo_is_key_source_unavailable() {
        let (db, _dir) = temp_db();
        let app = app(test_state(db).await);

        let mut claims = claims_for("kc-1", "", &["member"]);
        claims.as_object_mut().unwrap().remove("email");
        let (status, body) = get_as(&app, "/me", Some(&sign(&claims))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "key_source_unavailable");
    }

    #[tokio::test]
    async fn new_users_join_default_team() {
        let (db, _dir) = temp_db();
        let state = test_state(db)
            .await
            .with_default_team(Some("Everyone".to_string()));
        let app = app(state.clone());

        let (_, first) = get_as(&app, "/me", Some(&member_token("kc-1"))).await;
        let (_, second) = get_as(&app, "/me", Some(&member_token("kc-2"))).await;

        let teams = TeamRepository::new(state.db());
        let team_id = teams.named_team_id("Everyone").unwrap().unwrap();
        assert_eq!(teams.list_all().unwrap().len(), 1);
        assert!(teams.get_membership(&team_id, &first).unwrap().is_some());
        assert!(teams.get_membership(&team_id, &second).unwrap().is_some());

        let events = ActivityRepository::new(state.db())
            .list_for_team(&team_id, 10)
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.activity_type == ActivityType::TeamMemberAdded));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_logins_share_one_default_team() {
        let (db, _dir) = temp_db();
        let state = test_state(db)
            .await
            .with_default_team(Some("Everyone".to_string()));

        let mut logins = Vec::new();
        for i in 0..16 {
            let state = state.clone();
            logins.push(tokio::spawn(async move {
                authenticate(&state, &member_token(&format!("kc-{i}"))).await
            }));
        }
        for login in logins {
            login.await.unwrap().unwrap();
        }

        let teams = TeamRepository::new(state.db());
        let all = teams.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Everyone");
        assert_eq!(teams.member_count(&all[0].id).unwrap(), 16);
    }
}
