// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Turns bearer tokens issued by an OIDC provider (Keycloak) into a
//! [`Principal`] and runs every request through the authorization gate.
//!
//! ## Auth Flow
//!
//! 1. Client authenticates with the provider and obtains an access token
//! 2. Client sends `Authorization: Bearer <token>` (or the session cookie)
//! 3. Server:
//!    - Verifies the token (JWKS, shared secret, or dev decoder)
//!    - Extracts:
//!      - `sub` → principal subject
//!      - `resource_access.<client>.roles` → `ROLE_*` authorities
//!    - Asks the rule table for a decision
//!
//! ## Security
//!
//! - Invalid, expired or late tokens count as anonymous, never as errors
//! - JWKS is cached with TTL and refreshed on unknown key ids
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod roles;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use claims::{extract_realm_roles, extract_roles, Principal, RoleSource, TokenClaims};
pub use error::AuthError;
pub use extractor::{Auth, OptionalAuth};
pub use jwks::JwksManager;
pub use middleware::{enforce, GatePipeline, PipelineSettings};
pub use roles::{to_authorities, Authority};
pub use verifier::{ClaimChecks, JwksVerifier, SharedSecretVerifier, TokenVerifier};

#[cfg(feature = "dev")]
pub use verifier::InsecureVerifier;
