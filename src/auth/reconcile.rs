// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Create-or-update of the local user on every authenticated request.
//!
//! # Overview
//!
//! 1. **Find by subject** - the user has logged in before
//! 2. **Find by email** - an existing row is re-linked to the new subject,
//!    only when email linking is enabled and the provider verified the
//!    address. Otherwise the email is held by another account and the
//!    request is refused.
//! 3. **Create** - first login of an unseen subject
//!
//! An existing row is rewritten only when email, names or roles drifted, so
//! reconciling the same identity twice performs a single write at most.
//! A uniqueness conflict on write means another request provisioned the
//! same user concurrently; the reconciler re-reads and proceeds once.

use chrono::Utc;

use super::claims::NormalizedIdentity;
use super::error::AuthError;
use super::store::IdentityStore;
use crate::storage::{StoreError, StoredUser};

/// Configuration for user reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Whether an unseen subject with a verified email may take over an
    /// existing row with the same address. Default: `true`
    pub link_by_email: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            link_by_email: true,
        }
    }
}

impl ReconcileConfig {
    #[must_use]
    pub fn with_link_by_email(mut self, enabled: bool) -> Self {
        self.link_by_email = enabled;
        self
    }
}

/// The action taken during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// A new user row was written.
    Created,
    /// The row existed and drifted fields were rewritten.
    Updated,
    /// The row existed and matched the token; nothing was written.
    Unchanged,
    /// A row found by email was re-linked to the token subject.
    LinkedByEmail,
}

impl ReconcileAction {
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Result of reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub user: StoredUser,
    pub action: ReconcileAction,
}

/// Failure of one reconciliation attempt.
enum Attempt {
    Conflict(String),
    EmailTaken { user_id: String },
    Store(&'static str, StoreError),
}

impl From<Attempt> for AuthError {
    fn from(attempt: Attempt) -> Self {
        match attempt {
            Attempt::Conflict(detail) => {
                tracing::error!(detail = %detail, "User write conflicted twice");
                AuthError::PersistenceError("upsert_user")
            }
            Attempt::EmailTaken { user_id } => {
                tracing::warn!(user_id = %user_id, "Email belongs to another account, not linking");
                AuthError::Forbidden("email address belongs to another account".to_string())
            }
            Attempt::Store(operation, e) => {
                tracing::error!(operation, error = %e, "User store failure");
                AuthError::PersistenceError(operation)
            }
        }
    }
}

/// Reconciles normalized identities with local user rows.
pub struct UserReconciler<'a> {
    store: &'a dyn IdentityStore,
    config: ReconcileConfig,
}

impl<'a> UserReconciler<'a> {
    pub fn new(store: &'a dyn IdentityStore, config: ReconcileConfig) -> Self {
        Self { store, config }
    }

    /// Make the local row match `identity` and gate on `is_active`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UserInactive`] when the (updated) row is deactivated
    /// - [`AuthError::Forbidden`] when the email belongs to a row that may not be re-linked
    /// - [`AuthError::PersistenceError`] naming the failed store operation
    pub fn reconcile(&self, identity: &NormalizedIdentity) -> Result<Reconciliation, AuthError> {
        let outcome = match self.attempt(identity) {
            Err(Attempt::Conflict(detail)) => {
                tracing::debug!(
                    subject = %identity.subject_id,
                    detail = %detail,
                    "Concurrent provisioning detected, re-reading user"
                );
                self.attempt(identity)?
            }
            other => other?,
        };

        match outcome.action {
            ReconcileAction::Created => tracing::info!(
                user_id = %outcome.user.id,
                subject = %outcome.user.subject_id,
                "User provisioned"
            ),
            ReconcileAction::LinkedByEmail => tracing::info!(
                user_id = %outcome.user.id,
                subject = %outcome.user.subject_id,
                "User re-linked to new subject by email"
            ),
            ReconcileAction::Updated => tracing::debug!(
                user_id = %outcome.user.id,
                "User profile synchronized"
            ),
            ReconcileAction::Unchanged => {}
        }

        if !outcome.user.is_active {
            tracing::warn!(user_id = %outcome.user.id, "Inactive user attempted access");
            return Err(AuthError::UserInactive);
        }
        Ok(outcome)
    }

    fn attempt(&self, identity: &NormalizedIdentity) -> Result<Reconciliation, Attempt> {
        let by_subject = self
            .store
            .find_user_by_subject_id(&identity.subject_id)
            .map_err(|e| Attempt::Store("find_user_by_subject_id", e))?;
        if let Some(existing) = by_subject {
            return self.sync(existing, identity, ReconcileAction::Updated);
        }

        if !identity.email.is_empty() {
            let by_email = self
                .store
                .find_user_by_email(&identity.email)
                .map_err(|e| Attempt::Store("find_user_by_email", e))?;
            if let Some(existing) = by_email {
                if !(self.config.link_by_email && identity.email_verified) {
                    return Err(Attempt::EmailTaken {
                        user_id: existing.id,
                    });
                }
                return self.sync(existing, identity, ReconcileAction::LinkedByEmail);
            }
        }

        self.create(identity)
    }

    fn create(&self, identity: &NormalizedIdentity) -> Result<Reconciliation, Attempt> {
        let now = Utc::now();
        let user = StoredUser {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: identity.subject_id.clone(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            roles: identity.roles.clone(),
            roles_synced_at: Some(now),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.write(&user)?;
        Ok(Reconciliation {
            user,
            action: ReconcileAction::Created,
        })
    }

    /// Apply drift to `existing`; write only when something changed.
    fn sync(
        &self,
        existing: StoredUser,
        identity: &NormalizedIdentity,
        drift_action: ReconcileAction,
    ) -> Result<Reconciliation, Attempt> {
        let now = Utc::now();
        let mut next = existing.clone();
        next.subject_id = identity.subject_id.clone();
        next.email = identity.email.clone();
        next.first_name = identity.first_name.clone();
        next.last_name = identity.last_name.clone();
        if next.roles != identity.roles {
            next.roles = identity.roles.clone();
            next.roles_synced_at = Some(now);
        }

        if next == existing {
            return Ok(Reconciliation {
                user: existing,
                action: ReconcileAction::Unchanged,
            });
        }

        next.updated_at = now;
        self.write(&next)?;
        Ok(Reconciliation {
            user: next,
            action: drift_action,
        })
    }

    fn write(&self, user: &StoredUser) -> Result<(), Attempt> {
        match self.store.upsert_user(user) {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(detail)) => Err(Attempt::Conflict(detail)),
            Err(e) => Err(Attempt::Store("upsert_user", e)),
        }
    }
}
