// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims, role extraction and the authenticated principal.
//!
//! Keycloak places client roles under
//! `resource_access.<client_id>.roles` and realm roles under
//! `realm_access.roles`:
//!
//! ```json
//! {
//!   "sub": "f3c1...",
//!   "preferred_username": "alice",
//!   "realm_access": { "roles": ["offline_access"] },
//!   "resource_access": {
//!     "spring-client": { "roles": ["admin", "user"] }
//!   }
//! }
//! ```
//!
//! Every step of that path is optional. A missing map, a missing client entry
//! or a `roles` value that is not a list all yield no roles.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::AuthError;
use super::roles::{to_authorities, Authority};

/// Claim holding per-client role lists.
pub const RESOURCE_ACCESS_CLAIM: &str = "resource_access";
/// Claim holding realm-wide roles.
pub const REALM_ACCESS_CLAIM: &str = "realm_access";
/// Key of the role list inside an access entry.
pub const ROLES_KEY: &str = "roles";

/// Decoded claims of a validated token.
///
/// Kept as an untyped JSON object; providers add arbitrary fields and only a
/// handful are read here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenClaims(Map<String, Value>);

impl TokenClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Build claims from a JSON value. Non-object values give empty claims.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String claim, ignoring values of any other type.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The `sub` claim, if present and non-empty.
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub").filter(|s| !s.is_empty())
    }

    /// The `exp` claim as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

/// Role names granted to `client_id` under `resource_access`.
///
/// Returned verbatim, in token order. Non-string list entries are skipped.
pub fn extract_roles(claims: &TokenClaims, client_id: &str) -> Vec<String> {
    let roles = claims
        .get(RESOURCE_ACCESS_CLAIM)
        .and_then(Value::as_object)
        .and_then(|access| access.get(client_id))
        .and_then(|client| client.get(ROLES_KEY));
    role_names(roles)
}

/// Role names under `realm_access.roles`.
pub fn extract_realm_roles(claims: &TokenClaims) -> Vec<String> {
    let roles = claims
        .get(REALM_ACCESS_CLAIM)
        .and_then(Value::as_object)
        .and_then(|realm| realm.get(ROLES_KEY));
    role_names(roles)
}

fn role_names(roles: Option<&Value>) -> Vec<String> {
    roles
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Where in the claims to look for roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSource {
    /// Client key under `resource_access`
    pub client_id: String,
    /// Also grant realm roles
    pub include_realm_roles: bool,
}

impl RoleSource {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            include_realm_roles: false,
        }
    }

    pub fn with_realm_roles(mut self, include: bool) -> Self {
        self.include_realm_roles = include;
        self
    }

    /// All role names this source grants for the given claims.
    pub fn roles(&self, claims: &TokenClaims) -> Vec<String> {
        let mut roles = extract_roles(claims, &self.client_id);
        if self.include_realm_roles {
            roles.extend(extract_realm_roles(claims));
        }
        roles
    }
}

/// The authenticated identity of the current request.
///
/// Built once per request by the pipeline and stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Subject identifier (`sub` claim)
    pub subject: String,

    /// `preferred_username`, when the provider sends it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Authorities derived from the token roles
    pub authorities: BTreeSet<Authority>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Principal with the given subject and authorities and no profile data.
    pub fn new(subject: impl Into<String>, authorities: BTreeSet<Authority>) -> Self {
        Self {
            subject: subject.into(),
            username: None,
            email: None,
            authorities,
            expires_at: None,
        }
    }

    /// Build the principal from validated claims.
    ///
    /// Fails only when the token carries no subject.
    pub fn from_claims(claims: &TokenClaims, source: &RoleSource) -> Result<Self, AuthError> {
        let subject = claims.subject().ok_or(AuthError::MissingSubject)?;

        Ok(Self {
            subject: subject.to_owned(),
            username: claims.get_str("preferred_username").map(str::to_owned),
            email: claims.get_str("email").map(str::to_owned),
            authorities: to_authorities(source.roles(claims)),
            expires_at: claims.expires_at(),
        })
    }

    pub fn has_authority(&self, authority: &Authority) -> bool {
        self.authorities.contains(authority)
    }

    /// Name to greet the user with: username if known, else the subject.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.subject)
    }
}
