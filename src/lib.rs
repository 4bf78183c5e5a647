// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Team Dashboard - Team & Project Collaboration API
//!
//! Identity is delegated to Keycloak. Every request carries a bearer token
//! that is verified against the realm key set, mapped onto a local user
//! record and checked against the access policy of its route.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum) and the router
//! - `auth` - Token verification, user reconciliation and access policies
//! - `providers` - Keycloak userinfo and admin API client
//! - `storage` - Users, teams, projects and activity (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;
