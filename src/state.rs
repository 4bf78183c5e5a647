// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{ReconcileConfig, TokenVerifier};
use crate::providers::KeycloakClient;
use crate::storage::Database;

/// Shared application state. Every field is built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub verifier: TokenVerifier,
    pub keycloak: KeycloakClient,
    /// Client whose `resource_access` roles are merged into realm roles.
    pub client_id: Option<String>,
    /// Team every newly provisioned user joins.
    pub default_team_name: Option<String>,
    pub reconcile: ReconcileConfig,
}

impl AppState {
    pub fn new(db: Database, verifier: TokenVerifier, keycloak: KeycloakClient) -> Self {
        Self {
            db: Arc::new(db),
            verifier,
            keycloak,
            client_id: None,
            default_team_name: None,
            reconcile: ReconcileConfig::default(),
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    #[must_use]
    pub fn with_default_team(mut self, name: Option<String>) -> Self {
        self.default_team_name = name;
        self
    }

    #[must_use]
    pub fn with_reconcile_config(mut self, config: ReconcileConfig) -> Self {
        self.reconcile = config;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}
