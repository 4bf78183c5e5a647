// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Teams and team memberships.
//!
//! Membership rows are the local source of truth for "is this user part of
//! this team". The membership `role` is informational only; access checks
//! use global roles from the token plus the existence of the row.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    pair_key, pair_right, prefix_range, Database, StoreError, StoreResult, NAMED_TEAMS,
    PROJECTS, TEAMS, TEAM_MEMBERS, TEAM_PROJECTS, USER_TEAMS,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredTeam {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Local id of the creating user
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredTeam {
    pub fn new(name: impl Into<String>, description: Option<String>, created_by: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Role of a user inside one team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    #[default]
    Member,
    Lead,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredMembership {
    pub team_id: String,
    pub user_id: String,
    pub role: MembershipRole,
    pub joined_at: DateTime<Utc>,
}

impl StoredMembership {
    pub fn new(team_id: &str, user_id: &str, role: MembershipRole) -> Self {
        Self {
            team_id: team_id.to_string(),
            user_id: user_id.to_string(),
            role,
            joined_at: Utc::now(),
        }
    }
}

/// Repository for team and membership operations.
pub struct TeamRepository<'a> {
    db: &'a Database,
}

impl<'a> TeamRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, team_id: &str) -> StoreResult<Option<StoredTeam>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEAMS)?;
        match table.get(team_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Create a team together with its first membership row.
    pub fn create(&self, team: &StoredTeam, founder: &StoredMembership) -> StoreResult<()> {
        let json = serde_json::to_vec(team)?;
        let member_json = serde_json::to_vec(founder)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut teams = write_txn.open_table(TEAMS)?;
            if teams.get(team.id.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("Team {}", team.id)));
            }
            teams.insert(team.id.as_str(), json.as_slice())?;

            let mut members = write_txn.open_table(TEAM_MEMBERS)?;
            let mut user_teams = write_txn.open_table(USER_TEAMS)?;
            let key = pair_key(&team.id, &founder.user_id);
            members.insert(key.as_str(), member_json.as_slice())?;
            let reverse = pair_key(&founder.user_id, &team.id);
            user_teams.insert(reverse.as_str(), founder.joined_at.timestamp())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn update(&self, team: &StoredTeam) -> StoreResult<()> {
        let json = serde_json::to_vec(team)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut teams = write_txn.open_table(TEAMS)?;
            if teams.get(team.id.as_str())?.is_none() {
                return Err(StoreError::NotFound(format!("Team {}", team.id)));
            }
            teams.insert(team.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a team, its memberships and its projects.
    pub fn delete(&self, team_id: &str) -> StoreResult<StoredTeam> {
        let (start, end) = prefix_range(team_id);

        let write_txn = self.db.begin_write()?;
        let team = {
            let mut teams = write_txn.open_table(TEAMS)?;
            let team: StoredTeam = match teams.remove(team_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StoreError::NotFound(format!("Team {team_id}"))),
            };

            let mut members = write_txn.open_table(TEAM_MEMBERS)?;
            let mut user_teams = write_txn.open_table(USER_TEAMS)?;
            let member_ids = collect_right_keys(&members, &start, &end)?;
            for user_id in &member_ids {
                members.remove(pair_key(team_id, user_id).as_str())?;
                user_teams.remove(pair_key(user_id, team_id).as_str())?;
            }

            let mut team_projects = write_txn.open_table(TEAM_PROJECTS)?;
            let mut projects = write_txn.open_table(PROJECTS)?;
            let project_ids = collect_right_keys(&team_projects, &start, &end)?;
            for project_id in &project_ids {
                team_projects.remove(pair_key(team_id, project_id).as_str())?;
                projects.remove(project_id.as_str())?;
            }

            let mut named = write_txn.open_table(NAMED_TEAMS)?;
            let reserved = named
                .get(team.name.as_str())?
                .is_some_and(|id| id.value() == team_id);
            if reserved {
                named.remove(team.name.as_str())?;
            }

            tracing::debug!(
                team_id,
                members = member_ids.len(),
                projects = project_ids.len(),
                "Team removed with dependents"
            );
            team
        };
        write_txn.commit()?;
        Ok(team)
    }

    /// All teams, newest first.
    pub fn list_all(&self) -> StoreResult<Vec<StoredTeam>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEAMS)?;

        let mut teams = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            teams.push(serde_json::from_slice::<StoredTeam>(value.value())?);
        }
        teams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(teams)
    }

    /// Find or create the server-managed team `name` and make `user_id` a
    /// member of it. Lookup, creation and the join share one write
    /// transaction, so concurrent callers all land in the same team.
    pub fn ensure_named_member(&self, name: &str, user_id: &str) -> StoreResult<String> {
        let write_txn = self.db.begin_write()?;
        let team_id = {
            let mut named = write_txn.open_table(NAMED_TEAMS)?;
            let mut teams = write_txn.open_table(TEAMS)?;

            let indexed = named.get(name)?.map(|id| id.value().to_string());
            let live = match indexed.as_deref() {
                Some(id) => teams.get(id)?.is_some(),
                None => false,
            };
            let team_id = match indexed {
                Some(id) if live => id,
                _ => {
                    let team = StoredTeam::new(name, None, user_id);
                    let json = serde_json::to_vec(&team)?;
                    teams.insert(team.id.as_str(), json.as_slice())?;
                    named.insert(name, team.id.as_str())?;
                    tracing::info!(team_id = %team.id, name, "Created named team");
                    team.id
                }
            };

            let mut members = write_txn.open_table(TEAM_MEMBERS)?;
            let key = pair_key(&team_id, user_id);
            if members.get(key.as_str())?.is_none() {
                let membership = StoredMembership::new(&team_id, user_id, MembershipRole::Member);
                let json = serde_json::to_vec(&membership)?;
                members.insert(key.as_str(), json.as_slice())?;

                let mut user_teams = write_txn.open_table(USER_TEAMS)?;
                let reverse = pair_key(user_id, &team_id);
                user_teams.insert(reverse.as_str(), membership.joined_at.timestamp())?;
            }
            team_id
        };
        write_txn.commit()?;
        Ok(team_id)
    }

    /// Id of the server-managed team `name`, if it exists.
    pub fn named_team_id(&self, name: &str) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NAMED_TEAMS)?;
        Ok(table.get(name)?.map(|id| id.value().to_string()))
    }

    // =========================================================================
    // Memberships
    // =========================================================================

    /// Add a membership row. The pair may exist at most once.
    pub fn add_member(&self, membership: &StoredMembership) -> StoreResult<()> {
        let json = serde_json::to_vec(membership)?;
        let key = pair_key(&membership.team_id, &membership.user_id);

        let write_txn = self.db.begin_write()?;
        {
            let teams = write_txn.open_table(TEAMS)?;
            if teams.get(membership.team_id.as_str())?.is_none() {
                return Err(StoreError::NotFound(format!("Team {}", membership.team_id)));
            }

            let mut members = write_txn.open_table(TEAM_MEMBERS)?;
            if members.get(key.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "Membership of {} in {}",
                    membership.user_id, membership.team_id
                )));
            }
            members.insert(key.as_str(), json.as_slice())?;

            let mut user_teams = write_txn.open_table(USER_TEAMS)?;
            let reverse = pair_key(&membership.user_id, &membership.team_id);
            user_teams.insert(reverse.as_str(), membership.joined_at.timestamp())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn remove_member(&self, team_id: &str, user_id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut members = write_txn.open_table(TEAM_MEMBERS)?;
            if members.remove(pair_key(team_id, user_id).as_str())?.is_none() {
                return Err(StoreError::NotFound(format!(
                    "Membership of {user_id} in {team_id}"
                )));
            }
            let mut user_teams = write_txn.open_table(USER_TEAMS)?;
            user_teams.remove(pair_key(user_id, team_id).as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_membership(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<StoredMembership>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEAM_MEMBERS)?;
        match table.get(pair_key(team_id, user_id).as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Memberships of a team, oldest first.
    pub fn list_members(&self, team_id: &str) -> StoreResult<Vec<StoredMembership>> {
        let (start, end) = prefix_range(team_id);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEAM_MEMBERS)?;

        let mut members = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            members.push(serde_json::from_slice::<StoredMembership>(value.value())?);
        }
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    pub fn member_count(&self, team_id: &str) -> StoreResult<usize> {
        let (start, end) = prefix_range(team_id);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEAM_MEMBERS)?;
        Ok(table.range(start.as_str()..end.as_str())?.count())
    }

    /// Ids of the teams `user_id` belongs to.
    pub fn team_ids_for_user(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let (start, end) = prefix_range(user_id);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_TEAMS)?;
        collect_right_keys(&table, &start, &end)
    }
}

/// Right halves of every `left|right` key in `[start, end)`.
pub(crate) fn collect_right_keys<T, V>(table: &T, start: &str, end: &str) -> StoreResult<Vec<String>>
where
    T: ReadableTable<&'static str, V>,
    V: redb::Value + 'static,
{
    let mut ids = Vec::new();
    for entry in table.range(start..end)? {
        let (key, _) = entry?;
        if let Some(right) = pair_right(key.value()) {
            ids.push(right.to_string());
        }
    }
    Ok(ids)
}
