// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized StoredUser
//! - `users_by_subject`: identity provider subject → user id
//! - `users_by_email`: lowercase email → user id
//! - `teams`: team id → serialized StoredTeam
//! - `named_teams`: reserved team name → team id
//! - `team_members`: `team_id|user_id` → serialized StoredMembership
//! - `user_teams`: `user_id|team_id` → joined-at timestamp
//! - `projects`: project id → serialized StoredProject
//! - `team_projects`: `team_id|project_id` → created-at timestamp
//! - `activity`: `!timestamp_be|event_id` → serialized ActivityEvent
//! - `team_activity`: `team_id|!timestamp_be|event_id` → activity key
//!
//! Secondary indexes are written in the same write transaction as the
//! primary row, so readers never observe one without the other.

use std::path::Path;

use redb::TableDefinition;

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: subject id → user id.
pub(crate) const USERS_BY_SUBJECT: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_subject");

/// Unique index: lowercase email → user id.
pub(crate) const USERS_BY_EMAIL: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_email");

pub(crate) const TEAMS: TableDefinition<&str, &[u8]> = TableDefinition::new("teams");

/// Unique index for teams the server manages by name (the default team).
/// User-created teams are not indexed; their names may repeat.
pub(crate) const NAMED_TEAMS: TableDefinition<&str, &str> = TableDefinition::new("named_teams");

/// Membership rows. The `team_id|user_id` key makes the pair unique.
pub(crate) const TEAM_MEMBERS: TableDefinition<&str, &[u8]> = TableDefinition::new("team_members");

/// Reverse membership index for "teams of user" scans.
pub(crate) const USER_TEAMS: TableDefinition<&str, i64> = TableDefinition::new("user_teams");

pub(crate) const PROJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("projects");

pub(crate) const TEAM_PROJECTS: TableDefinition<&str, i64> = TableDefinition::new("team_projects");

/// Activity feed. Keys sort newest first.
pub(crate) const ACTIVITY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("activity");

/// Per-team activity index. Values are keys into `activity`.
pub(crate) const TEAM_ACTIVITY: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("team_activity");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A unique index already points at a different row.
    #[error("uniqueness conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Key Helpers
// =============================================================================

/// Composite key `left|right` for pair tables.
pub(crate) fn pair_key(left: &str, right: &str) -> String {
    format!("{left}|{right}")
}

/// Half-open range covering every `prefix|*` key.
///
/// `}` is the byte after `|`, so the upper bound sorts after any key that
/// starts with `prefix|`.
pub(crate) fn prefix_range(prefix: &str) -> (String, String) {
    (format!("{prefix}|"), format!("{prefix}}}"))
}

/// Right half of a `left|right` key.
pub(crate) fn pair_right(key: &str) -> Option<&str> {
    key.split_once('|').map(|(_, right)| right)
}

/// Activity key: inverted big-endian timestamp, then the event id.
///
/// The inverted timestamp makes a forward scan return newest entries first.
pub(crate) fn activity_key(timestamp_micros: i64, event_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 1 + event_id.len());
    key.extend_from_slice(&(!(timestamp_micros as u64)).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// Team activity key: `team_id|` followed by the activity key.
pub(crate) fn team_activity_key(team_id: &str, activity_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(team_id.len() + 1 + activity_key.len());
    key.extend_from_slice(team_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(activity_key);
    key
}

/// Normalized form used for the email index.
pub(crate) fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID database shared by every repository.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_SUBJECT)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(TEAMS)?;
            let _ = write_txn.open_table(NAMED_TEAMS)?;
            let _ = write_txn.open_table(TEAM_MEMBERS)?;
            let _ = write_txn.open_table(USER_TEAMS)?;
            let _ = write_txn.open_table(PROJECTS)?;
            let _ = write_txn.open_table(TEAM_PROJECTS)?;
            let _ = write_txn.open_table(ACTIVITY)?;
            let _ = write_txn.open_table(TEAM_ACTIVITY)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Database opened");
        Ok(Self { db })
    }

    pub(crate) fn begin_read(&self) -> StoreResult<redb::ReadTransaction> {
        use redb::ReadableDatabase;
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn begin_write(&self) -> StoreResult<redb::WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Cheap read used by the readiness probe.
    pub fn ping(&self) -> StoreResult<()> {
        let read_txn = self.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
