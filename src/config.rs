// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into [`Config`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3001` |
//! | `DATA_DIR` | Directory holding the database file | `./data` |
//! | `DATABASE_FILE` | Database file name inside `DATA_DIR` | `dashboard.redb` |
//! | `KEYCLOAK_URL` | Identity provider base URL | `http://keycloak:8080` |
//! | `KEYCLOAK_REALM` | Realm name | `team-dashboard` |
//! | `KEYCLOAK_CLIENT_ID` | Client whose roles are read from `resource_access` | Optional |
//! | `KEYCLOAK_CLIENT_SECRET` | Secret for the admin client-credentials grant | Optional |
//! | `KEYCLOAK_ISSUER` | Expected `iss` claim | `{KEYCLOAK_URL}/realms/{realm}` |
//! | `KEYCLOAK_AUDIENCE` | Expected `aud` claim | Optional (not checked) |
//! | `KEYCLOAK_JWKS_URL` | Signing key set URL | `{issuer base}/protocol/openid-connect/certs` |
//! | `AUTH_ALLOWED_ALGORITHMS` | Comma separated asymmetric JWT algorithms | `RS256` |
//! | `AUTH_CLOCK_SKEW_SECS` | Leeway applied to `exp`/`nbf`, at most `300` | `0` |
//! | `AUTH_LINK_BY_EMAIL` | Re-link an unseen subject to the row holding its verified email | `true` |
//! | `JWKS_CACHE_TTL_SECS` | Signing key cache TTL | `300` |
//! | `HTTP_TIMEOUT_SECS` | Timeout for every identity provider call | `10` |
//! | `CORS_ALLOWED_ORIGINS` | Comma separated origins | `http://localhost:3000,http://127.0.0.1:3000` |
//! | `DEFAULT_TEAM_NAME` | Team every new user joins on first login | Optional |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; both set enables HTTPS | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DATABASE_FILE_ENV: &str = "DATABASE_FILE";
pub const KEYCLOAK_URL_ENV: &str = "KEYCLOAK_URL";
pub const KEYCLOAK_REALM_ENV: &str = "KEYCLOAK_REALM";
pub const KEYCLOAK_CLIENT_ID_ENV: &str = "KEYCLOAK_CLIENT_ID";
pub const KEYCLOAK_CLIENT_SECRET_ENV: &str = "KEYCLOAK_CLIENT_SECRET";
pub const KEYCLOAK_ISSUER_ENV: &str = "KEYCLOAK_ISSUER";
pub const KEYCLOAK_AUDIENCE_ENV: &str = "KEYCLOAK_AUDIENCE";
pub const KEYCLOAK_JWKS_URL_ENV: &str = "KEYCLOAK_JWKS_URL";
pub const AUTH_ALLOWED_ALGORITHMS_ENV: &str = "AUTH_ALLOWED_ALGORITHMS";
pub const AUTH_CLOCK_SKEW_SECS_ENV: &str = "AUTH_CLOCK_SKEW_SECS";
pub const AUTH_LINK_BY_EMAIL_ENV: &str = "AUTH_LINK_BY_EMAIL";
pub const JWKS_CACHE_TTL_SECS_ENV: &str = "JWKS_CACHE_TTL_SECS";
pub const HTTP_TIMEOUT_SECS_ENV: &str = "HTTP_TIMEOUT_SECS";
pub const CORS_ALLOWED_ORIGINS_ENV: &str = "CORS_ALLOWED_ORIGINS";
pub const DEFAULT_TEAM_NAME_ENV: &str = "DEFAULT_TEAM_NAME";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_DATABASE_FILE: &str = "dashboard.redb";
const DEFAULT_KEYCLOAK_URL: &str = "http://keycloak:8080";
const DEFAULT_KEYCLOAK_REALM: &str = "team-dashboard";
const DEFAULT_ALLOWED_ALGORITHMS: &str = "RS256";
const MAX_CLOCK_SKEW_SECS: u64 = 300;
const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0} is not an asymmetric signing algorithm")]
    InsecureAlgorithm(String),

    #[error("{0} must name at least one signing algorithm")]
    NoAlgorithms(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Identity provider coordinates.
#[derive(Debug, Clone)]
pub struct KeycloakSettings {
    pub base_url: Url,
    pub realm: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl KeycloakSettings {
    /// `{base}/realms/{realm}`, the issuer Keycloak stamps into its tokens.
    pub fn realm_url(&self) -> String {
        format!(
            "{}/realms/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.realm
        )
    }
}

/// Token validation settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub jwks_url: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub allowed_algorithms: Vec<Algorithm>,
    pub clock_skew_secs: u64,
    pub jwks_cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub keycloak: KeycloakSettings,
    pub token: TokenSettings,
    pub http_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
    pub default_team_name: Option<String>,
    pub link_by_email: bool,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let port = parse_number(PORT_ENV, get(PORT_ENV), u64::from(DEFAULT_PORT))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            name: PORT_ENV,
            reason: format!("{port} is out of range"),
        })?;

        let data_dir = PathBuf::from(get_or(DATA_DIR_ENV, DEFAULT_DATA_DIR));
        let database_path = data_dir.join(get_or(DATABASE_FILE_ENV, DEFAULT_DATABASE_FILE));

        let base_url_raw = get_or(KEYCLOAK_URL_ENV, DEFAULT_KEYCLOAK_URL);
        let base_url = Url::parse(&base_url_raw).map_err(|e| ConfigError::Invalid {
            name: KEYCLOAK_URL_ENV,
            reason: e.to_string(),
        })?;
        let keycloak = KeycloakSettings {
            base_url,
            realm: get_or(KEYCLOAK_REALM_ENV, DEFAULT_KEYCLOAK_REALM),
            client_id: get(KEYCLOAK_CLIENT_ID_ENV),
            client_secret: get(KEYCLOAK_CLIENT_SECRET_ENV),
        };

        let realm_url = keycloak.realm_url();
        let token = TokenSettings {
            jwks_url: get(KEYCLOAK_JWKS_URL_ENV)
                .unwrap_or_else(|| format!("{realm_url}/protocol/openid-connect/certs")),
            issuer: Some(get(KEYCLOAK_ISSUER_ENV).unwrap_or(realm_url)),
            audience: get(KEYCLOAK_AUDIENCE_ENV),
            allowed_algorithms: parse_algorithms(
                &get_or(AUTH_ALLOWED_ALGORITHMS_ENV, DEFAULT_ALLOWED_ALGORITHMS),
            )?,
            clock_skew_secs: parse_clock_skew(get(AUTH_CLOCK_SKEW_SECS_ENV))?,
            jwks_cache_ttl: Duration::from_secs(parse_number(
                JWKS_CACHE_TTL_SECS_ENV,
                get(JWKS_CACHE_TTL_SECS_ENV),
                DEFAULT_JWKS_CACHE_TTL_SECS,
            )?),
        };

        let http_timeout = Duration::from_secs(parse_number(
            HTTP_TIMEOUT_SECS_ENV,
            get(HTTP_TIMEOUT_SECS_ENV),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: TLS_CERT_PATH_ENV,
                    reason: format!("{TLS_CERT_PATH_ENV} and {TLS_KEY_PATH_ENV} must be set together"),
                })
            }
        };

        let link_by_email = match get(AUTH_LINK_BY_EMAIL_ENV).as_deref() {
            Some("true") | None => true,
            Some("false") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: AUTH_LINK_BY_EMAIL_ENV,
                    reason: format!("expected `true` or `false`, got `{other}`"),
                })
            }
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    reason: format!("expected `json` or `pretty`, got `{other}`"),
                })
            }
        };

        Ok(Self {
            host: get_or(HOST_ENV, DEFAULT_HOST),
            port,
            database_path,
            keycloak,
            token,
            http_timeout,
            cors_allowed_origins: split_list(&get_or(CORS_ALLOWED_ORIGINS_ENV, DEFAULT_CORS_ORIGINS)),
            default_team_name: get(DEFAULT_TEAM_NAME_ENV),
            link_by_email,
            tls,
            log_format,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(name: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("`{value}` is not a non-negative integer"),
        }),
        None => Ok(default),
    }
}

fn parse_clock_skew(raw: Option<String>) -> Result<u64, ConfigError> {
    let secs = parse_number(AUTH_CLOCK_SKEW_SECS_ENV, raw, 0)?;
    if secs > MAX_CLOCK_SKEW_SECS {
        return Err(ConfigError::Invalid {
            name: AUTH_CLOCK_SKEW_SECS_ENV,
            reason: format!("{secs} exceeds the {MAX_CLOCK_SKEW_SECS}s maximum"),
        });
    }
    Ok(secs)
}

/// Parse the algorithm allow-list. Symmetric (`HS*`) algorithms are refused.
fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();
    for name in split_list(raw) {
        let algorithm = Algorithm::from_str(&name).map_err(|_| ConfigError::Invalid {
            name: AUTH_ALLOWED_ALGORITHMS_ENV,
            reason: format!("unknown algorithm `{name}`"),
        })?;
        if matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::InsecureAlgorithm(name));
        }
        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }
    if algorithms.is_empty() {
        return Err(ConfigError::NoAlgorithms(AUTH_ALLOWED_ALGORITHMS_ENV));
    }
    Ok(algorithms)
}
