// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Global roles understood by the dashboard.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Realm-level roles assigned in the identity provider.
///
/// ## Role Set
///
/// - `Admin` - Manages every team and project
/// - `TeamLead` - Creates teams and manages the teams they work in
/// - `Member` - Works on projects of the teams they belong to
///
/// Any other role string found in a token is ignored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Team lead
    TeamLead,
    /// Regular team member
    Member,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::TeamLead, Role::Member];

    /// Roles that may manage a team without being one of its members.
    pub const ELEVATED: [Role; 2] = [Role::Admin, Role::TeamLead];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::TeamLead => "team-lead",
            Role::Member => "member",
        }
    }

    pub fn is_elevated(&self) -> bool {
        Role::ELEVATED.contains(self)
    }
}

impl FromStr for Role {
    type Err = ();

    /// Parse role from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "team-lead" => Ok(Role::TeamLead),
            "member" => Ok(Role::Member),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort and de-duplicate a role list so equal sets compare equal.
pub fn normalize_roles(mut roles: Vec<Role>) -> Vec<Role> {
    roles.sort();
    roles.dedup();
    roles
}

/// Render a role list as `a, b, c` for log lines and error reasons.
pub fn describe(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
