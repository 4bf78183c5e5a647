// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Projects. Every project belongs to exactly one team.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    pair_key, prefix_range, Database, StoreError, StoreResult, PROJECTS, TEAMS, TEAM_PROJECTS,
};
use super::teams::collect_right_keys;

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    InProgress,
    Review,
    Completed,
    OnHold,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredProject {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub team_id: String,
    pub status: ProjectStatus,
    pub deadline: Option<DateTime<Utc>>,
    /// Local id of the creating user
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredProject {
    pub fn new(
        title: impl Into<String>,
        description: Option<String>,
        team_id: &str,
        created_by: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description,
            team_id: team_id.to_string(),
            status: ProjectStatus::default(),
            deadline: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository for project operations.
pub struct ProjectRepository<'a> {
    db: &'a Database,
}

impl<'a> ProjectRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, project_id: &str) -> StoreResult<Option<StoredProject>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROJECTS)?;
        match table.get(project_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Team that owns `project_id`, if the project exists.
    pub fn team_of(&self, project_id: &str) -> StoreResult<Option<String>> {
        Ok(self.get(project_id)?.map(|project| project.team_id))
    }

    /// Create a project under an existing team.
    pub fn create(&self, project: &StoredProject) -> StoreResult<()> {
        let json = serde_json::to_vec(project)?;

        let write_txn = self.db.begin_write()?;
        {
            let teams = write_txn.open_table(TEAMS)?;
            if teams.get(project.team_id.as_str())?.is_none() {
                return Err(StoreError::NotFound(format!("Team {}", project.team_id)));
            }

            let mut projects = write_txn.open_table(PROJECTS)?;
            if projects.get(project.id.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("Project {}", project.id)));
            }
            projects.insert(project.id.as_str(), json.as_slice())?;

            let mut team_projects = write_txn.open_table(TEAM_PROJECTS)?;
            let key = pair_key(&project.team_id, &project.id);
            team_projects.insert(key.as_str(), project.created_at.timestamp())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Overwrite a project. The owning team cannot change.
    pub fn update(&self, project: &StoredProject) -> StoreResult<()> {
        let json = serde_json::to_vec(project)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut projects = write_txn.open_table(PROJECTS)?;
            let existing: StoredProject = match projects.get(project.id.as_str())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StoreError::NotFound(format!("Project {}", project.id))),
            };
            if existing.team_id != project.team_id {
                return Err(StoreError::Conflict(format!(
                    "Project {} cannot move between teams",
                    project.id
                )));
            }
            projects.insert(project.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn delete(&self, project_id: &str) -> StoreResult<StoredProject> {
        let write_txn = self.db.begin_write()?;
        let project = {
            let mut projects = write_txn.open_table(PROJECTS)?;
            let project: StoredProject = match projects.remove(project_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StoreError::NotFound(format!("Project {project_id}"))),
            };
            let mut team_projects = write_txn.open_table(TEAM_PROJECTS)?;
            team_projects.remove(pair_key(&project.team_id, project_id).as_str())?;
            project
        };
        write_txn.commit()?;
        Ok(project)
    }

    /// Projects of one team, newest first.
    pub fn list_by_team(&self, team_id: &str) -> StoreResult<Vec<StoredProject>> {
        let (start, end) = prefix_range(team_id);
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TEAM_PROJECTS)?;
        let table = read_txn.open_table(PROJECTS)?;

        let mut projects = Vec::new();
        for project_id in collect_right_keys(&index, &start, &end)? {
            if let Some(value) = table.get(project_id.as_str())? {
                projects.push(serde_json::from_slice::<StoredProject>(value.value())?);
            }
        }
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    /// All projects, newest first.
    pub fn list_all(&self) -> StoreResult<Vec<StoredProject>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROJECTS)?;

        let mut projects = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            projects.push(serde_json::from_slice::<StoredProject>(value.value())?);
        }
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }
}
