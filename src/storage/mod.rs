// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single redb file (`DATA_DIR/DATABASE_FILE`).
//! Repositories borrow the shared [`Database`] and expose typed CRUD for one
//! entity each.
//!
//! ## Entities
//!
//! - users (mirrored from the identity provider, never hard-deleted)
//! - teams and team memberships
//! - projects (owned by a team, deleted with it)
//! - activity events (newest first)

pub mod activity;
pub mod database;
pub mod repository;

pub use activity::{ActivityEvent, ActivityRepository, ActivityType};
pub use database::{Database, StoreError, StoreResult};
pub use repository::{
    MembershipRole, ProjectRepository, ProjectStatus, StoredMembership, StoredProject,
    StoredTeam, StoredUser, TeamRepository, UserRepository,
};
