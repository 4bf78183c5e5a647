// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Team, membership and activity endpoints.
//!
//! Access is decided by the route's policy before a handler runs; handlers
//! only validate input and touch storage.

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    activity_log,
    auth::{Auth, Role},
    error::ApiError,
    models::{
        ActivityListResponse, ActivityQuery, AddMemberRequest, AvailableUsersResponse,
        CreateTeamRequest, MemberListResponse, OkResponse, TeamDetailResponse, TeamListResponse,
        TeamMemberResponse, TeamSummary, UpdateTeamRequest, UserSummary,
    },
    state::AppState,
    storage::{
        ActivityRepository, ActivityType, Database, MembershipRole, ProjectRepository,
        StoreResult, StoredMembership, StoredTeam, TeamRepository, UserRepository,
    },
};

const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const MAX_ACTIVITY_LIMIT: usize = 200;

/// Members of a team joined with their user rows. Rows whose user is gone
/// are skipped.
fn load_members(db: &Database, team_id: &str) -> StoreResult<Vec<TeamMemberResponse>> {
    let users = UserRepository::new(db);
    let mut members = Vec::new();
    for membership in TeamRepository::new(db).list_members(team_id)? {
        match users.get(&membership.user_id)? {
            Some(user) => members.push(TeamMemberResponse::new(membership, user)),
            None => {
                tracing::warn!(team_id, user_id = %membership.user_id, "Membership without user row");
            }
        }
    }
    Ok(members)
}

fn non_empty(value: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// The default team's name belongs to the server; users cannot create or
/// rename a team onto it.
fn reject_reserved(state: &AppState, name: &str) -> Result<(), ApiError> {
    match state.default_team_name.as_deref() {
        Some(reserved) if reserved.trim().eq_ignore_ascii_case(name) => Err(ApiError::conflict(
            format!("Team name {name} is reserved"),
        )),
        _ => Ok(()),
    }
}

/// List all teams.
#[utoipa::path(
    get,
    path = "/teams",
    tag = "Teams",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "List of teams", body = TeamListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_teams(
    Auth(_user): Auth,
    State(state): State<AppState>,
) -> Result<Json<TeamListResponse>, ApiError> {
    let teams_repo = TeamRepository::new(state.db());
    let projects_repo = ProjectRepository::new(state.db());

    let mut teams = Vec::new();
    for team in teams_repo.list_all()? {
        let members = teams_repo.member_count(&team.id)?;
        let projects = projects_repo.list_by_team(&team.id)?.len();
        teams.push(TeamSummary::new(team, members, projects));
    }
    let total = teams.len();

    Ok(Json(TeamListResponse { teams, total }))
}

/// Create a team. The creator becomes its lead.
#[utoipa::path(
    post,
    path = "/teams",
    tag = "Teams",
    security(("bearer_auth" = [])),
    request_body = CreateTeamRequest,
    responses(
        (status = 201, description = "Team created", body = StoredTeam),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - requires admin or team-lead role"),
        (status = 409, description = "Team name is reserved")
    )
)]
pub async fn create_team(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<StoredTeam>), ApiError> {
    let name = non_empty(&request.name, "name")?;
    reject_reserved(&state, &name)?;
    let team = StoredTeam::new(name, request.description, &user.id);
    let founder = StoredMembership::new(&team.id, &user.id, MembershipRole::Lead);

    TeamRepository::new(state.db()).create(&team, &founder)?;

    activity_log!(
        state.db(),
        ActivityType::TeamCreated,
        user.id,
        team = team.id,
        payload = json!({ "teamId": team.id, "name": team.name })
    );
    tracing::info!(team_id = %team.id, user_id = %user.id, "Team created");

    Ok((StatusCode::CREATED, Json(team)))
}

/// Get a team with its members and projects.
#[utoipa::path(
    get,
    path = "/teams/{team_id}",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID")
    ),
    responses(
        (status = 200, description = "Team details", body = TeamDetailResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a team member"),
        (status = 404, description = "Team not found")
    )
)]
pub async fn get_team(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<TeamDetailResponse>, ApiError> {
    let team = TeamRepository::new(state.db())
        .get(&team_id)?
        .ok_or_else(|| ApiError::not_found(format!("Team {team_id} not found")))?;
    let members = load_members(state.db(), &team_id)?;
    let projects = ProjectRepository::new(state.db()).list_by_team(&team_id)?;

    Ok(Json(TeamDetailResponse {
        team,
        members,
        projects,
    }))
}

/// Update a team's name or description.
#[utoipa::path(
    patch,
    path = "/teams/{team_id}",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID")
    ),
    request_body = UpdateTeamRequest,
    responses(
        (status = 200, description = "Team updated", body = StoredTeam),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Team not found"),
        (status = 409, description = "Team name is reserved")
    )
)]
pub async fn update_team(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<UpdateTeamRequest>,
) -> Result<Json<StoredTeam>, ApiError> {
    let repo = TeamRepository::new(state.db());
    let mut team = repo
        .get(&team_id)?
        .ok_or_else(|| ApiError::not_found(format!("Team {team_id} not found")))?;

    if let Some(name) = request.name {
        let name = non_empty(&name, "name")?;
        if name != team.name {
            reject_reserved(&state, &name)?;
        }
        team.name = name;
    }
    if let Some(description) = request.description {
        team.description = Some(description);
    }
    team.updated_at = Utc::now();
    repo.update(&team)?;

    activity_log!(state.db(), ActivityType::TeamUpdated, user.id, team = team_id);

    Ok(Json(team))
}

/// Delete a team together with its memberships and projects.
#[utoipa::path(
    delete,
    path = "/teams/{team_id}",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID")
    ),
    responses(
        (status = 200, description = "Team deleted", body = OkResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Team not found")
    )
)]
pub async fn delete_team(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let team = TeamRepository::new(state.db()).delete(&team_id)?;

    activity_log!(
        state.db(),
        ActivityType::TeamDeleted,
        user.id,
        team = team_id,
        payload = json!({ "teamId": team.id, "name": team.name })
    );
    tracing::info!(team_id = %team_id, user_id = %user.id, "Team deleted");

    Ok(Json(OkResponse { ok: true }))
}

/// List team members with their global roles.
#[utoipa::path(
    get,
    path = "/teams/{team_id}/members",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID")
    ),
    responses(
        (status = 200, description = "Team members", body = MemberListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a team member")
    )
)]
pub async fn list_members(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<MemberListResponse>, ApiError> {
    let members = load_members(state.db(), &team_id)?;
    let total = members.len();
    Ok(Json(MemberListResponse { members, total }))
}

/// Add a user to a team.
///
/// The realm role in the request (default `member`) is granted in Keycloak
/// on a best-effort basis; a failed grant does not fail the request.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/members",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID")
    ),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = TeamMemberResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Team or user not found"),
        (status = 409, description = "User is already a member")
    )
)]
pub async fn add_member(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<TeamMemberResponse>), ApiError> {
    let target = UserRepository::new(state.db())
        .get(&request.user_id)?
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", request.user_id)))?;

    let realm_role = request.role.unwrap_or(Role::Member);
    let membership_role = if realm_role.is_elevated() {
        MembershipRole::Lead
    } else {
        MembershipRole::Member
    };
    let membership = StoredMembership::new(&team_id, &target.id, membership_role);
    TeamRepository::new(state.db()).add_member(&membership)?;

    state
        .keycloak
        .assign_realm_role_best_effort(&target.subject_id, realm_role)
        .await;

    activity_log!(
        state.db(),
        ActivityType::TeamMemberAdded,
        user.id,
        team = team_id,
        payload = json!({ "teamId": team_id, "userId": target.id, "role": realm_role })
    );

    Ok((
        StatusCode::CREATED,
        Json(TeamMemberResponse::new(membership, target)),
    ))
}

/// Remove a user from a team.
#[utoipa::path(
    delete,
    path = "/teams/{team_id}/members/{user_id}",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID"),
        ("user_id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Member removed", body = OkResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Membership not found")
    )
)]
pub async fn remove_member(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((team_id, user_id)): Path<(String, String)>,
) -> Result<Json<OkResponse>, ApiError> {
    TeamRepository::new(state.db()).remove_member(&team_id, &user_id)?;

    activity_log!(
        state.db(),
        ActivityType::TeamMemberRemoved,
        user.id,
        team = team_id,
        payload = json!({ "teamId": team_id, "userId": user_id })
    );

    Ok(Json(OkResponse { ok: true }))
}

/// Active users who are not yet members of the team, by name.
#[utoipa::path(
    get,
    path = "/teams/{team_id}/available-users",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID")
    ),
    responses(
        (status = 200, description = "Users that can be added", body = AvailableUsersResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a team member")
    )
)]
pub async fn available_users(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<AvailableUsersResponse>, ApiError> {
    let members: HashSet<String> = TeamRepository::new(state.db())
        .list_members(&team_id)?
        .into_iter()
        .map(|m| m.user_id)
        .collect();

    let users = UserRepository::new(state.db())
        .list_all()?
        .into_iter()
        .filter(|u| u.is_active && !members.contains(&u.id))
        .map(UserSummary::from)
        .collect();

    Ok(Json(AvailableUsersResponse { users }))
}

/// Newest activity of a team.
#[utoipa::path(
    get,
    path = "/teams/{team_id}/activity",
    tag = "Teams",
    security(("bearer_auth" = [])),
    params(
        ("team_id" = String, Path, description = "Team ID"),
        ActivityQuery
    ),
    responses(
        (status = 200, description = "Activity feed", body = ActivityListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a team member")
    )
)]
pub async fn team_activity(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityListResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let events = ActivityRepository::new(state.db()).list_for_team(&team_id, limit)?;
    let total = events.len();
    Ok(Json(ActivityListResponse { events, total }))
}
