// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The slice of persistence the auth pipeline depends on.

use crate::storage::{
    Database, StoreResult, StoredMembership, StoredUser, TeamRepository, UserRepository,
};

/// Persistence contract used by the reconciler and the access decision layer.
///
/// `upsert_user` must be atomic and must reject (with
/// [`crate::storage::StoreError::Conflict`]) a write whose subject or email
/// is already held by a different user.
pub trait IdentityStore: Send + Sync {
    fn find_user_by_subject_id(&self, subject_id: &str) -> StoreResult<Option<StoredUser>>;

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>>;

    fn upsert_user(&self, user: &StoredUser) -> StoreResult<()>;

    fn find_membership(&self, team_id: &str, user_id: &str)
        -> StoreResult<Option<StoredMembership>>;
}

impl IdentityStore for Database {
    fn find_user_by_subject_id(&self, subject_id: &str) -> StoreResult<Option<StoredUser>> {
        UserRepository::new(self).find_by_subject(subject_id)
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        UserRepository::new(self).find_by_email(email)
    }

    fn upsert_user(&self, user: &StoredUser) -> StoreResult<()> {
        UserRepository::new(self).save(user)
    }

    fn find_membership(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<StoredMembership>> {
        TeamRepository::new(self).get_membership(team_id, user_id)
    }
}
