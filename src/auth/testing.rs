// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token builders shared by the unit tests.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

pub const TEST_SECRET: &[u8] = b"role-gate-test-secret";
pub const TEST_CLIENT: &str = "spring-client";

/// HS256 token signed with [`TEST_SECRET`].
pub fn sign(claims: &Value) -> String {
    sign_with_secret(claims, TEST_SECRET)
}

pub fn sign_with_secret(claims: &Value, secret: &[u8]) -> String {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret)).unwrap()
}

/// Token for `sub` holding `roles` under [`TEST_CLIENT`], expiring
/// `exp_offset` seconds from now.
pub fn token_for(sub: &str, roles: &[&str], exp_offset: i64) -> String {
    let mut resource_access = serde_json::Map::new();
    resource_access.insert(TEST_CLIENT.to_string(), json!({ "roles": roles }));

    sign(&json!({
        "sub": sub,
        "preferred_username": sub,
        "exp": chrono::Utc::now().timestamp() + exp_offset,
        "resource_access": resource_access
    }))
}

/// Unsigned token (fake signature), for the development verifier.
#[cfg(feature = "dev")]
pub fn unsigned(claims: &Value) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.fake_signature")
}
