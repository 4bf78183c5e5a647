// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Field names are camelCase on
//! the wire. Stored rows ([`StoredTeam`], [`StoredProject`], ...) are
//! returned as-is where the client needs nothing else.
//!
//! ## Model Categories
//!
//! - **Auth**: the caller's identity and profile
//! - **Teams**: teams, memberships and candidate members
//! - **Projects**: projects within a team
//! - **Activity**: the team activity feed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{CurrentUser, Role};
use crate::storage::{
    ActivityEvent, MembershipRole, ProjectStatus, StoredMembership, StoredProject, StoredTeam,
    StoredUser,
};

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub message: String,
    pub user: CurrentUser,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub subject_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub roles: Vec<Role>,
    pub is_admin: bool,
    pub is_active: bool,
    /// Teams the caller belongs to.
    pub teams: Vec<TeamSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub message: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub admin_features: Vec<String>,
}

// =============================================================================
// Teams
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A team with membership and project counts.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub member_count: usize,
    pub project_count: usize,
}

impl TeamSummary {
    pub fn new(team: StoredTeam, member_count: usize, project_count: usize) -> Self {
        Self {
            id: team.id,
            name: team.name,
            description: team.description,
            created_by: team.created_by,
            created_at: team.created_at,
            member_count,
            project_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamListResponse {
    pub teams: Vec<TeamSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamDetailResponse {
    pub team: StoredTeam,
    pub members: Vec<TeamMemberResponse>,
    pub projects: Vec<StoredProject>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: String,
    /// Realm role granted in the identity provider. Default: `member`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// A member row joined with the user it points at.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberResponse {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub membership_role: MembershipRole,
    pub joined_at: DateTime<Utc>,
    /// Highest global role: admin, then team-lead, then member.
    pub role: Role,
    pub is_admin: bool,
    pub is_team_lead: bool,
    pub can_manage_team: bool,
}

impl TeamMemberResponse {
    pub fn new(membership: StoredMembership, user: StoredUser) -> Self {
        let is_admin = user.roles.contains(&Role::Admin);
        let is_team_lead = user.roles.contains(&Role::TeamLead);
        Self {
            role: primary_role(&user.roles),
            is_admin,
            is_team_lead,
            can_manage_team: is_admin || is_team_lead,
            user_id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
            membership_role: membership.role,
            joined_at: membership.joined_at,
        }
    }
}

/// Highest role held; users without roles count as members.
pub fn primary_role(roles: &[Role]) -> Role {
    Role::ALL
        .into_iter()
        .find(|role| roles.contains(role))
        .unwrap_or(Role::Member)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberListResponse {
    pub members: Vec<TeamMemberResponse>,
    pub total: usize,
}

/// A user that can be added to a team.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<StoredUser> for UserSummary {
    fn from(user: StoredUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailableUsersResponse {
    pub users: Vec<UserSummary>,
}

// =============================================================================
// Projects
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub team_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Projects never move between teams; a different value is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProjectListQuery {
    /// Only projects of this team.
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub projects: Vec<StoredProject>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectDetailResponse {
    pub project: StoredProject,
    pub team: Option<StoredTeam>,
}

// =============================================================================
// Activity
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    /// Maximum number of events (default 50, at most 200).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivityListResponse {
    pub events: Vec<ActivityEvent>,
    pub total: usize,
}

/// Acknowledgement for deletes.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}
