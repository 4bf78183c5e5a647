// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing_subscriber::EnvFilter;

use team_dashboard_server::{
    api::router,
    auth::{JwksManager, ReconcileConfig, TokenVerifier},
    config::{Config, LogFormat},
    providers::KeycloakClient,
    state::AppState,
    storage::Database,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Pretty);
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let http = match reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let db = match Database::open(&config.database_path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(
                error = %e,
                path = %config.database_path.display(),
                "Failed to open database"
            );
            return ExitCode::FAILURE;
        }
    };

    let jwks = JwksManager::new(config.token.jwks_url.clone(), http.clone())
        .with_cache_ttl(config.token.jwks_cache_ttl);
    let verifier = TokenVerifier::new(jwks, &config.token);
    let keycloak = KeycloakClient::new(&config.keycloak, http);

    let state = AppState::new(db, verifier, keycloak)
        .with_client_id(config.keycloak.client_id.clone())
        .with_default_team(config.default_team_name.clone())
        .with_reconcile_config(
            ReconcileConfig::default().with_link_by_email(config.link_by_email),
        );
    let app = router(state, &config.cors_allowed_origins);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, host = %config.host, "Failed to parse bind address");
            return ExitCode::FAILURE;
        }
    };

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received, draining connections");
        shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    let served = match &config.tls {
        Some(tls) => {
            let tls_config = match RustlsConfig::from_pem_file(&tls.cert, &tls.key).await {
                Ok(tls_config) => tls_config,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load TLS certificate");
                    return ExitCode::FAILURE;
                }
            };
            tracing::info!(
                %addr,
                realm = %config.keycloak.realm,
                "Team dashboard listening on https (docs at /docs)"
            );
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            tracing::info!(
                %addr,
                realm = %config.keycloak.realm,
                "Team dashboard listening on http (docs at /docs)"
            );
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    match served {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
