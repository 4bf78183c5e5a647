// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local user records mirrored from the identity provider.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    email_key, Database, StoreError, StoreResult, USERS, USERS_BY_EMAIL, USERS_BY_SUBJECT,
};
use crate::auth::Role;

/// User row. Never hard-deleted; deactivation flips `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    /// Local identifier (UUID v4)
    pub id: String,
    /// Identity provider subject (`sub` claim)
    pub subject_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Global roles as last seen in a token; sorted, no duplicates
    pub roles: Vec<Role>,
    pub roles_synced_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a user by local id.
    pub fn get(&self, user_id: &str) -> StoreResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn find_by_subject(&self, subject_id: &str) -> StoreResult<Option<StoredUser>> {
        let user_id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(USERS_BY_SUBJECT)?;
            match index.get(subject_id)? {
                Some(id) => id.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get(&user_id)
    }

    /// Case-insensitive email lookup.
    pub fn find_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        let key = email_key(email);
        let user_id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(USERS_BY_EMAIL)?;
            match index.get(key.as_str())? {
                Some(id) => id.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get(&user_id)
    }

    /// Insert or update a user and its unique indexes atomically.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the subject or email index already
    /// points at a different user. Nothing is written in that case.
    pub fn save(&self, user: &StoredUser) -> StoreResult<()> {
        let json = serde_json::to_vec(user)?;
        let email = email_key(&user.email);

        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut by_subject = write_txn.open_table(USERS_BY_SUBJECT)?;
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;

            if let Some(owner) = by_subject.get(user.subject_id.as_str())? {
                if owner.value() != user.id {
                    return Err(StoreError::Conflict(format!(
                        "subject {} belongs to another user",
                        user.subject_id
                    )));
                }
            }
            if !email.is_empty() {
                if let Some(owner) = by_email.get(email.as_str())? {
                    if owner.value() != user.id {
                        return Err(StoreError::Conflict(format!(
                            "email {email} belongs to another user"
                        )));
                    }
                }
            }

            // Drop index entries for values this user no longer holds.
            let previous: Option<StoredUser> = match users.get(user.id.as_str())? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            if let Some(previous) = previous {
                if previous.subject_id != user.subject_id {
                    by_subject.remove(previous.subject_id.as_str())?;
                }
                let previous_email = email_key(&previous.email);
                if previous_email != email && !previous_email.is_empty() {
                    by_email.remove(previous_email.as_str())?;
                }
            }

            users.insert(user.id.as_str(), json.as_slice())?;
            by_subject.insert(user.subject_id.as_str(), user.id.as_str())?;
            if !email.is_empty() {
                by_email.insert(email.as_str(), user.id.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Toggle `is_active`. Returns the updated row.
    pub fn set_active(&self, user_id: &str, active: bool) -> StoreResult<StoredUser> {
        let mut user = self
            .get(user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("User {user_id}")))?;
        user.is_active = active;
        user.updated_at = Utc::now();
        self.save(&user)?;
        Ok(user)
    }

    /// All users, ordered by first then last name.
    pub fn list_all(&self) -> StoreResult<Vec<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        let mut users = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            users.push(serde_json::from_slice::<StoredUser>(value.value())?);
        }
        users.sort_by(|a, b| {
            (a.first_name.as_str(), a.last_name.as_str())
                .cmp(&(b.first_name.as_str(), b.last_name.as_str()))
        });
        Ok(users)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        Ok(table.len()?)
    }
}
