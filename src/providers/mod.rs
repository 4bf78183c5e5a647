// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External service clients.

pub mod keycloak;

pub use keycloak::{KeycloakClient, KeycloakError, UserInfo};
