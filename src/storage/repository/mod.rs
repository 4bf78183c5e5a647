// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the database.
//!
//! Each repository provides CRUD operations for a specific entity type and
//! keeps that entity's secondary indexes consistent.

pub mod projects;
pub mod teams;
pub mod users;

pub use projects::{ProjectRepository, ProjectStatus, StoredProject};
pub use teams::{MembershipRole, StoredMembership, StoredTeam, TeamRepository};
pub use users::{StoredUser, UserRepository};
