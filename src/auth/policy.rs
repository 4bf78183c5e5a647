// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-route access policies and their evaluation.
//!
//! ## Invariants
//!
//! - Every route carries exactly one [`AccessPolicy`]
//! - Every policy other than `Public` requires a reconciled identity
//! - Team-scoped policies deny when no team id can be resolved
//! - Global roles come from the token; team membership comes from local rows

use super::describe_roles;
use super::identity::CurrentUser;
use super::store::IdentityStore;
use super::{AuthError, Role};

/// Access requirement attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    /// No identity required.
    Public,
    /// Any verified, active user.
    AuthenticatedOnly,
    /// Caller holds at least one of the listed global roles.
    RequiresAnyRole(Vec<Role>),
    /// Caller has a membership row for the request's team.
    RequiresTeamMembership,
    /// Caller holds `admin` or `team-lead`, or has a membership row for the
    /// request's team.
    RequiresTeamRoleOrMembership,
}

impl AccessPolicy {
    pub fn any_role(roles: &[Role]) -> Self {
        AccessPolicy::RequiresAnyRole(roles.to_vec())
    }

    pub fn requires_identity(&self) -> bool {
        !matches!(self, AccessPolicy::Public)
    }

    /// Whether evaluation needs a resolved team id.
    pub fn is_team_scoped(&self) -> bool {
        matches!(
            self,
            AccessPolicy::RequiresTeamMembership | AccessPolicy::RequiresTeamRoleOrMembership
        )
    }

    /// Short label for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            AccessPolicy::Public => "public",
            AccessPolicy::AuthenticatedOnly => "authenticated_only",
            AccessPolicy::RequiresAnyRole(_) => "requires_any_role",
            AccessPolicy::RequiresTeamMembership => "requires_team_membership",
            AccessPolicy::RequiresTeamRoleOrMembership => "requires_team_role_or_membership",
        }
    }
}

/// Authorization decision outcome.
///
/// `allowed` is authoritative; `reason` is for logs and, on denial, the
/// response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AuthorizationDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Evaluate `policy` for `user` against the resolved `team_id`.
///
/// # Errors
///
/// - [`AuthError::Unauthenticated`] when the policy needs an identity and
///   none is present
/// - [`AuthError::PersistenceError`] when the membership lookup fails
pub fn evaluate(
    policy: &AccessPolicy,
    user: Option<&CurrentUser>,
    team_id: Option<&str>,
    store: &dyn IdentityStore,
) -> Result<AuthorizationDecision, AuthError> {
    let user = match (policy, user) {
        (AccessPolicy::Public, _) => return Ok(AuthorizationDecision::allow("public route")),
        (_, None) => return Err(AuthError::Unauthenticated),
        (_, Some(user)) => user,
    };

    let decision = match policy {
        AccessPolicy::Public => unreachable!("handled above"),
        AccessPolicy::AuthenticatedOnly => AuthorizationDecision::allow("authenticated"),
        AccessPolicy::RequiresAnyRole(required) => {
            match required.iter().find(|role| user.has_role(**role)) {
                Some(role) => AuthorizationDecision::allow(format!("holds role {role}")),
                None => AuthorizationDecision::deny(format!(
                    "requires one of: {}",
                    describe_roles(required)
                )),
            }
        }
        AccessPolicy::RequiresTeamMembership => match team_id {
            None => AuthorizationDecision::deny("team id is required"),
            Some(team_id) => membership_decision(user, team_id, store)?,
        },
        AccessPolicy::RequiresTeamRoleOrMembership => match team_id {
            None => AuthorizationDecision::deny("team id is required"),
            Some(_) if user.is_elevated() => {
                AuthorizationDecision::allow("holds elevated role")
            }
            Some(team_id) => {
                let decision = membership_decision(user, team_id, store)?;
                if decision.allowed {
                    decision
                } else {
                    AuthorizationDecision::deny(format!(
                        "requires one of: {}, or membership in team {team_id}",
                        describe_roles(&Role::ELEVATED)
                    ))
                }
            }
        },
    };
    Ok(decision)
}

fn membership_decision(
    user: &CurrentUser,
    team_id: &str,
    store: &dyn IdentityStore,
) -> Result<AuthorizationDecision, AuthError> {
    let membership = store.find_membership(team_id, &user.id).map_err(|e| {
        tracing::error!(team_id, user_id = %user.id, error = %e, "Membership lookup failed");
        AuthError::PersistenceError("find_membership")
    })?;
    Ok(match membership {
        Some(_) => AuthorizationDecision::allow("team member"),
        None => AuthorizationDecision::deny(format!("requires membership in team {team_id}")),
    })
}

/// Evaluate, log and convert a denial into [`AuthError::Forbidden`].
pub fn enforce(
    policy: &AccessPolicy,
    user: Option<&CurrentUser>,
    team_id: Option<&str>,
    store: &dyn IdentityStore,
    path: &str,
) -> Result<(), AuthError> {
    let decision = evaluate(policy, user, team_id, store)?;
    let user_id = user.map(|u| u.id.as_str()).unwrap_or("-");

    if decision.allowed {
        tracing::debug!(
            policy = policy.name(),
            user_id,
            team_id,
            path,
            reason = %decision.reason,
            "Access allowed"
        );
        Ok(())
    } else {
        tracing::warn!(
            policy = policy.name(),
            user_id,
            team_id,
            path,
            reason = %decision.reason,
            "Access denied"
        );
        Err(AuthError::Forbidden(decision.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;
    use crate::storage::{MembershipRole, StoredMembership, StoredTeam, TeamRepository};

    fn user(id: &str, roles: Vec<Role>) -> CurrentUser {
        CurrentUser {
            id: id.into(),
            subject_id: format!("sub-{id}"),
            email: format!("{id}@example.com"),
            first_name: String::new(),
            last_name: String::new(),
            roles,
            is_active: true,
        }
    }

    #[test]
    fn public_needs_no_identity() {
        let (db, _dir) = temp_db();
        let decision = evaluate(&AccessPolicy::Public, None, None, &db).unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn missing_identity_is_unauthenticated() {
        let (db, _dir) = temp_db();
        for policy in [
            AccessPolicy::AuthenticatedOnly,
            AccessPolicy::any_role(&[Role::Member]),
            AccessPolicy::RequiresTeamMembership,
            AccessPolicy::RequiresTeamRoleOrMembership,
        ] {
            let result = evaluate(&policy, None, Some("t-1"), &db);
            assert_eq!(result, Err(AuthError::Unauthenticated), "{}", policy.name());
        }
    }

    #[test]
    fn any_role_is_an_intersection() {
        let (db, _dir) = temp_db();
        let member = user("u-1", vec![Role::Member]);

        let managers = AccessPolicy::any_role(&[Role::Admin, Role::TeamLead]);
        let decision = evaluate(&managers, Some(&member), None, &db).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "requires one of: admin, team-lead");

        let members = AccessPolicy::any_role(&[Role::Member]);
        assert!(evaluate(&members, Some(&member), None, &db).unwrap().allowed);

        let enforced = enforce(&managers, Some(&member), None, &db, "/teams");
        assert!(matches!(enforced, Err(AuthError::Forbidden(_))));
    }

    #[test]
    fn membership_row_grants_access() {
        let (db, _dir) = temp_db();
        let teams = TeamRepository::new(&db);
        let team = StoredTeam::new("Platform", None, "founder");
        teams
            .create(&team, &StoredMembership::new(&team.id, "founder", MembershipRole::Lead))
            .unwrap();

        let outsider = user("u-2", vec![Role::Member]);
        let policy = AccessPolicy::RequiresTeamMembership;
        let denied = evaluate(&policy, Some(&outsider), Some(&team.id), &db).unwrap();
        assert!(!denied.allowed);
        assert!(denied.reason.contains(&team.id));

        teams
            .add_member(&StoredMembership::new(&team.id, "u-2", MembershipRole::Member))
            .unwrap();
        let allowed = evaluate(&policy, Some(&outsider), Some(&team.id), &db).unwrap();
        assert!(allowed.allowed);
    }

    #[test]
    fn elevated_role_bypasses_membership() {
        let (db, _dir) = temp_db();
        let policy = AccessPolicy::RequiresTeamRoleOrMembership;

        let lead = user("u-1", vec![Role::TeamLead]);
        assert!(evaluate(&policy, Some(&lead), Some("t-1"), &db).unwrap().allowed);

        let member = user("u-2", vec![Role::Member]);
        let decision = evaluate(&policy, Some(&member), Some("t-1"), &db).unwrap();
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason,
            "requires one of: admin, team-lead, or membership in team t-1"
        );

        // Elevated roles do not grant plain membership checks.
        let decision =
            evaluate(&AccessPolicy::RequiresTeamMembership, Some(&lead), Some("t-1"), &db).unwrap();
        assert!(!decision.allowed);
    }

    #[test]
    fn unresolved_team_is_denied() {
        let (db, _dir) = temp_db();
        let admin = user("u-1", vec![Role::Admin]);
        for policy in [
            AccessPolicy::RequiresTeamMembership,
            AccessPolicy::RequiresTeamRoleOrMembership,
        ] {
            let decision = evaluate(&policy, Some(&admin), None, &db).unwrap();
            assert!(!decision.allowed);
            assert_eq!(decision.reason, "team id is required");
        }
    }
}
