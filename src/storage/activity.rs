// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity feed for team and project changes.
//!
//! Every mutating team/project endpoint records one event. Recording is best
//! effort: a failed write is logged and never fails the request that caused
//! it.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::database::{
    activity_key, team_activity_key, Database, StoreResult, ACTIVITY, TEAM_ACTIVITY,
};

/// Types of recorded events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    // Team events
    TeamCreated,
    TeamUpdated,
    TeamDeleted,
    TeamMemberAdded,
    TeamMemberRemoved,

    // Project events
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,

    // Identity events
    UserProvisioned,
}

/// An activity feed entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    /// Local id of the user who caused the event.
    pub actor_user_id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub team_id: Option<String>,
    pub project_id: Option<String>,
    /// Event-specific details.
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(activity_type: ActivityType, actor_user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor_user_id: actor_user_id.into(),
            activity_type,
            team_id: None,
            project_id: None,
            payload: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Repository for activity events.
pub struct ActivityRepository<'a> {
    db: &'a Database,
}

impl<'a> ActivityRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn record(&self, event: &ActivityEvent) -> StoreResult<()> {
        let json = serde_json::to_vec(event)?;
        let key = activity_key(event.created_at.timestamp_micros(), &event.id);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACTIVITY)?;
            table.insert(key.as_slice(), json.as_slice())?;

            if let Some(team_id) = event.team_id.as_deref() {
                let mut by_team = write_txn.open_table(TEAM_ACTIVITY)?;
                let index_key = team_activity_key(team_id, &key);
                by_team.insert(index_key.as_slice(), key.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Record an event, logging instead of failing.
    pub fn record_best_effort(&self, event: &ActivityEvent) {
        if let Err(e) = self.record(event) {
            tracing::warn!(
                activity_type = ?event.activity_type,
                actor = %event.actor_user_id,
                error = %e,
                "Failed to record activity"
            );
        }
    }

    /// Newest events for a team, at most `limit`.
    pub fn list_for_team(&self, team_id: &str, limit: usize) -> StoreResult<Vec<ActivityEvent>> {
        let start = format!("{team_id}|").into_bytes();
        let end = format!("{team_id}}}").into_bytes();

        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TEAM_ACTIVITY)?;
        let table = read_txn.open_table(ACTIVITY)?;

        let mut events = Vec::with_capacity(limit.min(64));
        for entry in index.range(start.as_slice()..end.as_slice())?.take(limit) {
            let (_, primary) = entry?;
            match table.get(primary.value())? {
                Some(value) => events.push(serde_json::from_slice(value.value())?),
                None => tracing::warn!(team_id, "Team activity index points at missing event"),
            }
        }
        Ok(events)
    }

    /// Newest events across all teams, at most `limit`.
    #[cfg(test)]
    pub(crate) fn list_recent(&self, limit: usize) -> StoreResult<Vec<ActivityEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACTIVITY)?;

        let mut events = Vec::new();
        for entry in table.iter()?.take(limit) {
            let (_, value) = entry?;
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }
}

/// Record an activity event without failing the caller.
///
/// ```rust,ignore
/// activity_log!(&state.db, ActivityType::TeamCreated, user.id, team = team.id);
/// ```
#[macro_export]
macro_rules! activity_log {
    ($db:expr, $activity_type:expr, $actor:expr) => {{
        let event = $crate::storage::ActivityEvent::new($activity_type, $actor.clone());
        $crate::storage::ActivityRepository::new($db).record_best_effort(&event);
    }};
    ($db:expr, $activity_type:expr, $actor:expr, team = $team:expr) => {{
        let event = $crate::storage::ActivityEvent::new($activity_type, $actor.clone())
            .with_team($team.clone());
        $crate::storage::ActivityRepository::new($db).record_best_effort(&event);
    }};
    ($db:expr, $activity_type:expr, $actor:expr, team = $team:expr, payload = $payload:expr) => {{
        let event = $crate::storage::ActivityEvent::new($activity_type, $actor.clone())
            .with_team($team.clone())
            .with_payload($payload);
        $crate::storage::ActivityRepository::new($db).record_best_effort(&event);
    }};
    ($db:expr, $activity_type:expr, $actor:expr, team = $team:expr, project = $project:expr) => {{
        let event = $crate::storage::ActivityEvent::new($activity_type, $actor.clone())
            .with_team($team.clone())
            .with_project($project.clone());
        $crate::storage::ActivityRepository::new($db).record_best_effort(&event);
    }};
    ($db:expr, $activity_type:expr, $actor:expr, team = $team:expr, project = $project:expr, payload = $payload:expr) => {{
        let event = $crate::storage::ActivityEvent::new($activity_type, $actor.clone())
            .with_team($team.clone())
            .with_project($project.clone())
            .with_payload($payload);
        $crate::storage::ActivityRepository::new($db).record_best_effort(&event);
    }};
}
