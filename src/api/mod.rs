// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method, Request},
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{with_policy, AccessPolicy, CurrentUser, Role},
    models::{
        ActivityListResponse, AddMemberRequest, AdminResponse, AvailableUsersResponse,
        CreateProjectRequest, CreateTeamRequest, MeResponse, MemberListResponse, OkResponse,
        ProfileResponse, ProjectDetailResponse, ProjectListResponse, TeamDetailResponse,
        TeamListResponse, TeamMemberResponse, TeamSummary, UpdateProjectRequest,
        UpdateTeamRequest, UserSummary,
    },
    state::AppState,
    storage::{
        ActivityEvent, ActivityType, MembershipRole, ProjectStatus, StoredProject, StoredTeam,
    },
};

pub mod auth;
pub mod health;
pub mod projects;
pub mod teams;

/// Build the application router. Every route carries exactly one access
/// policy.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    use AccessPolicy::{
        AuthenticatedOnly, Public, RequiresTeamMembership, RequiresTeamRoleOrMembership,
    };

    let any_role = AccessPolicy::any_role(&Role::ALL);
    let managers = AccessPolicy::any_role(&Role::ELEVATED);
    let admins = AccessPolicy::any_role(&[Role::Admin]);
    let s = &state;

    let routes = Router::new()
        // Health
        .route("/health/live", with_policy(get(health::liveness), s, Public))
        .route("/auth/health", with_policy(get(health::auth_health), s, Public))
        // Identity
        .route("/auth/me", with_policy(get(auth::me), s, AuthenticatedOnly))
        .route("/auth/profile", with_policy(get(auth::profile), s, AuthenticatedOnly))
        .route("/auth/admin", with_policy(get(auth::admin), s, admins))
        // Teams
        .route(
            "/teams",
            with_policy(get(teams::list_teams), s, any_role)
                .merge(with_policy(post(teams::create_team), s, managers)),
        )
        .route(
            "/teams/{team_id}",
            with_policy(get(teams::get_team), s, RequiresTeamMembership).merge(with_policy(
                patch(teams::update_team).delete(teams::delete_team),
                s,
                RequiresTeamRoleOrMembership,
            )),
        )
        .route(
            "/teams/{team_id}/members",
            with_policy(get(teams::list_members), s, RequiresTeamMembership).merge(
                with_policy(post(teams::add_member), s, RequiresTeamRoleOrMembership),
            ),
        )
        .route(
            "/teams/{team_id}/members/{user_id}",
            with_policy(delete(teams::remove_member), s, RequiresTeamRoleOrMembership),
        )
        .route(
            "/teams/{team_id}/available-users",
            with_policy(get(teams::available_users), s, RequiresTeamMembership),
        )
        .route(
            "/teams/{team_id}/activity",
            with_policy(get(teams::team_activity), s, RequiresTeamMembership),
        )
        // Projects
        .route(
            "/projects",
            with_policy(get(projects::list_projects), s, AuthenticatedOnly)
                .merge(with_policy(post(projects::create_project), s, RequiresTeamMembership)),
        )
        .route(
            "/projects/{project_id}",
            with_policy(
                get(projects::get_project)
                    .patch(projects::update_project)
                    .delete(projects::delete_project),
                s,
                RequiresTeamMembership,
            ),
        )
        .with_state(state);

    routes
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors_layer(cors_origins))
}

/// CORS for the configured origins; `*` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::auth_health,
        auth::me,
        auth::profile,
        auth::admin,
        teams::list_teams,
        teams::create_team,
        teams::get_team,
        teams::update_team,
        teams::delete_team,
        teams::list_members,
        teams::add_member,
        teams::remove_member,
        teams::available_users,
        teams::team_activity,
        projects::list_projects,
        projects::create_project,
        projects::get_project,
        projects::update_project,
        projects::delete_project
    ),
    components(
        schemas(
            CurrentUser,
            Role,
            MeResponse,
            ProfileResponse,
            AdminResponse,
            StoredTeam,
            TeamSummary,
            TeamListResponse,
            TeamDetailResponse,
            CreateTeamRequest,
            UpdateTeamRequest,
            AddMemberRequest,
            MembershipRole,
            TeamMemberResponse,
            MemberListResponse,
            UserSummary,
            AvailableUsersResponse,
            StoredProject,
            ProjectStatus,
            CreateProjectRequest,
            UpdateProjectRequest,
            ProjectListResponse,
            ProjectDetailResponse,
            ActivityEvent,
            ActivityType,
            ActivityListResponse,
            OkResponse,
            health::HealthResponse,
            health::AuthHealthResponse,
            health::AuthHealthChecks
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and auth subsystem health"),
        (name = "Auth", description = "Identity of the caller"),
        (name = "Teams", description = "Teams, members and activity"),
        (name = "Projects", description = "Projects within teams")
    )
)]
struct ApiDoc;
