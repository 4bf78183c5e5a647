// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Project endpoints.
//!
//! A project belongs to exactly one team for its whole life. Access to a
//! single project is decided by membership in that team.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    activity_log,
    auth::Auth,
    error::ApiError,
    models::{
        CreateProjectRequest, OkResponse, ProjectDetailResponse, ProjectListQuery,
        ProjectListResponse, UpdateProjectRequest,
    },
    state::AppState,
    storage::{ActivityType, ProjectRepository, StoredProject, TeamRepository},
};

/// List projects, optionally for one team.
#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    security(("bearer_auth" = [])),
    params(ProjectListQuery),
    responses(
        (status = 200, description = "List of projects", body = ProjectListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_projects(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<ProjectListResponse>, ApiError> {
    let repo = ProjectRepository::new(state.db());
    let projects = match query.team_id.as_deref().filter(|id| !id.is_empty()) {
        Some(team_id) => repo.list_by_team(team_id)?,
        None => repo.list_all()?,
    };
    let total = projects.len();
    Ok(Json(ProjectListResponse { projects, total }))
}

/// Create a project in a team the caller belongs to.
#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    security(("bearer_auth" = [])),
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = StoredProject),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a member of the team"),
        (status = 404, description = "Team not found")
    )
)]
pub async fn create_project(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<StoredProject>), ApiError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }

    let mut project = StoredProject::new(title, request.description, &request.team_id, &user.id);
    if let Some(status) = request.status {
        project.status = status;
    }
    project.deadline = request.deadline;

    ProjectRepository::new(state.db()).create(&project)?;

    activity_log!(
        state.db(),
        ActivityType::ProjectCreated,
        user.id,
        team = project.team_id,
        project = project.id,
        payload = json!({ "title": project.title })
    );
    tracing::info!(project_id = %project.id, team_id = %project.team_id, "Project created");

    Ok((StatusCode::CREATED, Json(project)))
}

/// Get a project and its team.
#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    tag = "Projects",
    security(("bearer_auth" = [])),
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project details", body = ProjectDetailResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a member of the project's team"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn get_project(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectDetailResponse>, ApiError> {
    let project = ProjectRepository::new(state.db())
        .get(&project_id)?
        .ok_or_else(|| ApiError::not_found(format!("Project {project_id} not found")))?;
    let team = TeamRepository::new(state.db()).get(&project.team_id)?;

    Ok(Json(ProjectDetailResponse { project, team }))
}

/// Update a project's title, description, status or deadline.
#[utoipa::path(
    patch,
    path = "/projects/{project_id}",
    tag = "Projects",
    security(("bearer_auth" = [])),
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = StoredProject),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Project not found"),
        (status = 409, description = "Project cannot move between teams")
    )
)]
pub async fn update_project(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Json<StoredProject>, ApiError> {
    let repo = ProjectRepository::new(state.db());
    let mut project = repo
        .get(&project_id)?
        .ok_or_else(|| ApiError::not_found(format!("Project {project_id} not found")))?;

    if let Some(title) = request.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::bad_request("title must not be empty"));
        }
        project.title = title.to_string();
    }
    if let Some(description) = request.description {
        project.description = Some(description);
    }
    if let Some(status) = request.status {
        project.status = status;
    }
    if request.deadline.is_some() {
        project.deadline = request.deadline;
    }
    if let Some(team_id) = request.team_id {
        project.team_id = team_id;
    }
    project.updated_at = Utc::now();
    repo.update(&project)?;

    activity_log!(
        state.db(),
        ActivityType::ProjectUpdated,
        user.id,
        team = project.team_id,
        project = project.id
    );

    Ok(Json(project))
}

/// Delete a project.
#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    tag = "Projects",
    security(("bearer_auth" = [])),
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project deleted", body = OkResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn delete_project(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let project = ProjectRepository::new(state.db()).delete(&project_id)?;

    activity_log!(
        state.db(),
        ActivityType::ProjectDeleted,
        user.id,
        team = project.team_id,
        project = project.id
    );

    Ok(Json(OkResponse { ok: true }))
}
