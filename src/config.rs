// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`Settings`] read from them
//! once at startup. Malformed values fail startup; nothing is re-read per
//! request.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `GATE_RULES_FILE` | JSON rule table | Built-in gateway table |
//! | `OIDC_ISSUER_URL` | Expected issuer; Keycloak realm URL | Required for JWKS mode |
//! | `OIDC_JWKS_URL` | JWKS endpoint | `<issuer>/protocol/openid-connect/certs` |
//! | `OIDC_CLIENT_ID` | Client key under `resource_access` | `spring-client` |
//! | `OIDC_AUDIENCE` | Expected audience claim | Not checked |
//! | `OIDC_INCLUDE_REALM_ROLES` | Also map `realm_access.roles` | `false` |
//! | `GATE_SHARED_SECRET` | HS256 secret, replaces JWKS verification | Unset |
//! | `GATE_DEV_INSECURE` | Skip signature checks (`dev` builds only) | `false` |
//! | `GATE_SESSION_COOKIE` | Cookie carrying the token | Unset |
//! | `GATE_LOGIN_URL` | Redirect for challenged browser requests | Unset (401) |
//! | `GATE_VALIDATION_TIMEOUT_MS` | Token verification timeout | `2000` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::auth::jwks::keycloak_jwks_url;
use crate::auth::middleware::{DEFAULT_CLIENT_ID, DEFAULT_VALIDATION_TIMEOUT};
use crate::auth::{ClaimChecks, PipelineSettings, RoleSource};
use crate::error::ConfigError;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const RULES_FILE_ENV: &str = "GATE_RULES_FILE";
pub const ISSUER_ENV: &str = "OIDC_ISSUER_URL";
pub const JWKS_URL_ENV: &str = "OIDC_JWKS_URL";
pub const CLIENT_ID_ENV: &str = "OIDC_CLIENT_ID";
pub const AUDIENCE_ENV: &str = "OIDC_AUDIENCE";
pub const REALM_ROLES_ENV: &str = "OIDC_INCLUDE_REALM_ROLES";
pub const SHARED_SECRET_ENV: &str = "GATE_SHARED_SECRET";
pub const DEV_INSECURE_ENV: &str = "GATE_DEV_INSECURE";
pub const SESSION_COOKIE_ENV: &str = "GATE_SESSION_COOKIE";
pub const LOGIN_URL_ENV: &str = "GATE_LOGIN_URL";
pub const VALIDATION_TIMEOUT_ENV: &str = "GATE_VALIDATION_TIMEOUT_MS";

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// How bearer tokens are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierSettings {
    /// Asymmetric keys from a JWKS endpoint
    Jwks { jwks_url: String },
    /// HS256 with a shared secret
    SharedSecret(String),
    /// No signature verification (`dev` feature only)
    #[cfg(feature = "dev")]
    Insecure,
}

/// Settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    /// Rule file; `None` runs with the built-in gateway table
    pub rules_file: Option<PathBuf>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub verifier: VerifierSettings,
    pub pipeline: PipelineSettings,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidSetting {
                name: PORT_ENV,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::InvalidSetting {
                    name: HOST_ENV,
                    reason: e.to_string(),
                })?;

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidSetting {
                    name: LOG_FORMAT_ENV,
                    reason: format!("expected 'json' or 'pretty', got '{other}'"),
                })
            }
        };

        let issuer = get(ISSUER_ENV)
            .map(|v| parse_url(ISSUER_ENV, v))
            .transpose()?;
        let jwks_url = get(JWKS_URL_ENV)
            .map(|v| parse_url(JWKS_URL_ENV, v))
            .transpose()?;
        let login_url = get(LOGIN_URL_ENV)
            .map(|v| parse_url(LOGIN_URL_ENV, v))
            .transpose()?;

        let dev_insecure = parse_bool(DEV_INSECURE_ENV, get(DEV_INSECURE_ENV))?;
        let verifier = if dev_insecure {
            insecure_verifier()?
        } else if let Some(secret) = get(SHARED_SECRET_ENV) {
            VerifierSettings::SharedSecret(secret)
        } else if let Some(jwks_url) = jwks_url {
            VerifierSettings::Jwks { jwks_url }
        } else if let Some(ref issuer) = issuer {
            let jwks_url = keycloak_jwks_url(issuer).map_err(|e| ConfigError::InvalidSetting {
                name: ISSUER_ENV,
                reason: e.to_string(),
            })?;
            VerifierSettings::Jwks { jwks_url }
        } else {
            return Err(ConfigError::MissingSetting(ISSUER_ENV));
        };

        let validation_timeout = match get(VALIDATION_TIMEOUT_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidSetting {
                        name: VALIDATION_TIMEOUT_ENV,
                        reason: format!("expected a positive number of milliseconds, got '{raw}'"),
                    })
                }
            },
            None => DEFAULT_VALIDATION_TIMEOUT,
        };

        let role_source =
            RoleSource::new(get(CLIENT_ID_ENV).unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()))
                .with_realm_roles(parse_bool(REALM_ROLES_ENV, get(REALM_ROLES_ENV))?);

        Ok(Self {
            bind_addr,
            log_format,
            rules_file: get(RULES_FILE_ENV).map(PathBuf::from),
            issuer,
            audience: get(AUDIENCE_ENV),
            verifier,
            pipeline: PipelineSettings {
                role_source,
                session_cookie: get(SESSION_COOKIE_ENV),
                login_url,
                validation_timeout,
            },
        })
    }

    /// Issuer and audience checks for the verifier.
    pub fn claim_checks(&self) -> ClaimChecks {
        ClaimChecks {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
        }
    }
}

fn parse_url(name: &'static str, raw: String) -> Result<String, ConfigError> {
    Url::parse(&raw).map_err(|e| ConfigError::InvalidSetting {
        name,
        reason: format!("'{raw}' is not a valid URL: {e}"),
    })?;
    Ok(raw)
}

fn parse_bool(name: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.map(|v| v.to_lowercase()).as_deref() {
        None | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(other) => Err(ConfigError::InvalidSetting {
            name,
            reason: format!("expected true or false, got '{other}'"),
        }),
    }
}

#[cfg(feature = "dev")]
fn insecure_verifier() -> Result<VerifierSettings, ConfigError> {
    Ok(VerifierSettings::Insecure)
}

#[cfg(not(feature = "dev"))]
fn insecure_verifier() -> Result<VerifierSettings, ConfigError> {
    Err(ConfigError::InvalidSetting {
        name: DEV_INSECURE_ENV,
        reason: "this build does not include the `dev` feature".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    const ISSUER: &str = "https://sso.example.com/realms/demo";

    #[test]
    fn defaults_with_issuer_only() {
        let s = settings(&[(ISSUER_ENV, ISSUER)]).unwrap();

        assert_eq!(s.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(s.log_format, LogFormat::Pretty);
        assert!(s.rules_file.is_none());
        assert_eq!(
            s.verifier,
            VerifierSettings::Jwks {
                jwks_url: format!("{ISSUER}/protocol/openid-connect/certs")
            }
        );
        assert_eq!(s.pipeline.role_source, RoleSource::new("spring-client"));
        assert_eq!(s.pipeline.validation_timeout, Duration::from_secs(2));
        assert_eq!(s.claim_checks().issuer.as_deref(), Some(ISSUER));
        assert!(s.claim_checks().audience.is_none());
    }

    #[test]
    fn verifier_needs_some_key_source() {
        assert!(matches!(
            settings(&[]),
            Err(ConfigError::MissingSetting(ISSUER_ENV))
        ));
    }

    #[test]
    fn explicit_jwks_url_wins_over_issuer() {
        let s = settings(&[
            (ISSUER_ENV, ISSUER),
            (JWKS_URL_ENV, "https://keys.example.com/jwks.json"),
        ])
        .unwrap();
        assert_eq!(
            s.verifier,
            VerifierSettings::Jwks {
                jwks_url: "https://keys.example.com/jwks.json".into()
            }
        );
    }

    #[test]
    fn shared_secret_mode() {
        let s = settings(&[(SHARED_SECRET_ENV, "s3cret")]).unwrap();
        assert_eq!(s.verifier, VerifierSettings::SharedSecret("s3cret".into()));
        assert!(s.issuer.is_none());
    }

    #[test]
    fn full_configuration() {
        let s = settings(&[
            (HOST_ENV, "127.0.0.1"),
            (PORT_ENV, "9090"),
            (LOG_FORMAT_ENV, "json"),
            (RULES_FILE_ENV, "/etc/role-gate/rules.json"),
            (ISSUER_ENV, ISSUER),
            (CLIENT_ID_ENV, "gateway"),
            (AUDIENCE_ENV, "gateway"),
            (REALM_ROLES_ENV, "true"),
            (SESSION_COOKIE_ENV, "access_token"),
            (LOGIN_URL_ENV, "https://sso.example.com/login"),
            (VALIDATION_TIMEOUT_ENV, "500"),
        ])
        .unwrap();

        assert_eq!(s.bind_addr, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(s.log_format, LogFormat::Json);
        assert_eq!(s.rules_file, Some(PathBuf::from("/etc/role-gate/rules.json")));
        assert_eq!(
            s.pipeline.role_source,
            RoleSource::new("gateway").with_realm_roles(true)
        );
        assert_eq!(s.pipeline.session_cookie.as_deref(), Some("access_token"));
        assert_eq!(
            s.pipeline.login_url.as_deref(),
            Some("https://sso.example.com/login")
        );
        assert_eq!(s.pipeline.validation_timeout, Duration::from_millis(500));
        assert_eq!(s.claim_checks().audience.as_deref(), Some("gateway"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[(ISSUER_ENV, ISSUER), (PORT_ENV, "  "), (SESSION_COOKIE_ENV, "")])
            .unwrap();
        assert_eq!(s.bind_addr.port(), 8080);
        assert!(s.pipeline.session_cookie.is_none());
    }

    #[test]
    fn malformed_values_are_rejected() {
        let cases = [
            (PORT_ENV, "eighty"),
            (HOST_ENV, "not a host"),
            (LOG_FORMAT_ENV, "xml"),
            (LOGIN_URL_ENV, "/relative/login"),
            (VALIDATION_TIMEOUT_ENV, "0"),
            (VALIDATION_TIMEOUT_ENV, "soon"),
            (REALM_ROLES_ENV, "maybe"),
        ];
        for (name, value) in cases {
            let result = settings(&[(ISSUER_ENV, ISSUER), (name, value)]);
            assert!(
                matches!(result, Err(ConfigError::InvalidSetting { .. })),
                "{name}={value} should be rejected"
            );
        }

        assert!(matches!(
            settings(&[(ISSUER_ENV, "sso.example.com")]),
            Err(ConfigError::InvalidSetting { name: ISSUER_ENV, .. })
        ));
    }

    #[cfg(not(feature = "dev"))]
    #[test]
    fn insecure_mode_needs_dev_build() {
        let result = settings(&[(DEV_INSECURE_ENV, "true")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSetting { name: DEV_INSECURE_ENV, .. })
        ));
    }

    #[cfg(feature = "dev")]
    #[test]
    fn insecure_mode_in_dev_build() {
        let s = settings(&[(DEV_INSECURE_ENV, "true")]).unwrap();
        assert_eq!(s.verifier, VerifierSettings::Insecure);
    }
}
