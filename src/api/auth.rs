// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity endpoints for the authenticated caller.

use axum::{extract::State, Json};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{AdminResponse, MeResponse, ProfileResponse, TeamSummary},
    state::AppState,
    storage::{ProjectRepository, TeamRepository},
};

/// Current user.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authenticated user", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn me(Auth(user): Auth) -> Json<MeResponse> {
    Json(MeResponse {
        message: "User authenticated successfully".to_string(),
        is_admin: user.is_admin(),
        user,
    })
}

/// Full profile of the current user, with the teams they belong to.
#[utoipa::path(
    get,
    path = "/auth/profile",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn profile(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let teams_repo = TeamRepository::new(state.db());
    let projects_repo = ProjectRepository::new(state.db());

    let mut teams = Vec::new();
    for team_id in teams_repo.team_ids_for_user(&user.id)? {
        let Some(team) = teams_repo.get(&team_id)? else {
            continue;
        };
        let members = teams_repo.member_count(&team_id)?;
        let projects = projects_repo.list_by_team(&team_id)?.len();
        teams.push(TeamSummary::new(team, members, projects));
    }

    Ok(Json(ProfileResponse {
        full_name: format!("{} {}", user.first_name, user.last_name)
            .trim()
            .to_string(),
        is_admin: user.is_admin(),
        id: user.id,
        subject_id: user.subject_id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        roles: user.roles,
        is_active: user.is_active,
        teams,
    }))
}

/// Admin-only check.
#[utoipa::path(
    get,
    path = "/auth/admin",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Admin access granted", body = AdminResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - requires admin role")
    )
)]
pub async fn admin(Auth(user): Auth) -> Json<AdminResponse> {
    Json(AdminResponse {
        message: "Admin access granted".to_string(),
        email: user.email,
        roles: user.roles,
        admin_features: [
            "Manage teams",
            "Manage projects",
            "Manage users",
            "View all data",
        ]
        .into_iter()
        .map(str::to_string)
        .collect(),
    })
}
