// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sample pages served behind the gate.
//!
//! Handlers never check roles. By the time one runs, the rule table has
//! already allowed the request; they only read the principal back.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, OptionalAuth, Principal};

/// Plain text payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// The authenticated principal as seen by the gate.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrincipalResponse {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Granted authorities, e.g. `ROLE_ADMIN`
    pub authorities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Principal> for PrincipalResponse {
    fn from(p: Principal) -> Self {
        Self {
            authorities: p.authorities.iter().map(|a| a.to_string()).collect(),
            subject: p.subject,
            username: p.username,
            email: p.email,
            expires_at: p.expires_at,
        }
    }
}

/// Public landing page. Greets the user when a valid token is presented.
#[utoipa::path(
    get,
    path = "/",
    tag = "Pages",
    responses((status = 200, description = "Landing page", body = MessageResponse))
)]
pub async fn home(OptionalAuth(principal): OptionalAuth) -> Json<MessageResponse> {
    match principal {
        Some(p) => MessageResponse::new(format!("Welcome back, {}", p.display_name())),
        None => MessageResponse::new("Welcome, please sign in"),
    }
}

#[utoipa::path(
    get,
    path = "/private",
    tag = "Pages",
    responses(
        (status = 200, description = "Private page", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn private(Auth(principal): Auth) -> Json<MessageResponse> {
    MessageResponse::new(format!("Private page for {}", principal.display_name()))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Pages",
    responses(
        (status = 200, description = "Current principal", body = PrincipalResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(Auth(principal): Auth) -> Json<PrincipalResponse> {
    Json(principal.into())
}

#[utoipa::path(
    get,
    path = "/user",
    tag = "Gateway",
    responses(
        (status = 200, description = "Greeting for ROLE_USER", body = MessageResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Missing ROLE_USER")
    ),
    security(("bearer_auth" = []))
)]
pub async fn user(Auth(principal): Auth) -> Json<MessageResponse> {
    MessageResponse::new(format!("Hello {}", principal.display_name()))
}

#[utoipa::path(
    get,
    path = "/admin",
    tag = "Gateway",
    responses(
        (status = 200, description = "Greeting for ROLE_ADMIN", body = MessageResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Missing ROLE_ADMIN")
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin(Auth(principal): Auth) -> Json<MessageResponse> {
    MessageResponse::new(format!("Hello {}", principal.display_name()))
}

/// Greeting with the identity the token asserts. The token itself is never
/// echoed back.
#[utoipa::path(
    get,
    path = "/credentials",
    tag = "Gateway",
    responses(
        (status = 200, description = "Identity carried by the token", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn credentials(Auth(principal): Auth) -> Json<MessageResponse> {
    match principal.email {
        Some(ref email) => {
            MessageResponse::new(format!("Hello, {} <{email}>", principal.display_name()))
        }
        None => MessageResponse::new(format!("Hello, {}", principal.display_name())),
    }
}

#[utoipa::path(
    get,
    path = "/cart/index",
    tag = "Cart",
    responses((status = 200, description = "Service status", body = MessageResponse)),
    security(("bearer_auth" = []))
)]
pub async fn cart_index() -> Json<MessageResponse> {
    MessageResponse::new("cart service is running")
}

#[utoipa::path(
    get,
    path = "/cart/user",
    tag = "Cart",
    responses(
        (status = 200, description = "User page", body = MessageResponse),
        (status = 403, description = "Missing ROLE_USER")
    ),
    security(("bearer_auth" = []))
)]
pub async fn cart_user() -> Json<MessageResponse> {
    MessageResponse::new("user page from cart service")
}

#[utoipa::path(
    get,
    path = "/cart/admin",
    tag = "Cart",
    responses(
        (status = 200, description = "Admin page", body = MessageResponse),
        (status = 403, description = "Missing ROLE_ADMIN")
    ),
    security(("bearer_auth" = []))
)]
pub async fn cart_admin() -> Json<MessageResponse> {
    MessageResponse::new("admin page from cart service")
}

#[utoipa::path(
    get,
    path = "/products",
    tag = "Products",
    responses((status = 200, description = "Service status", body = MessageResponse)),
    security(("bearer_auth" = []))
)]
pub async fn products() -> Json<MessageResponse> {
    MessageResponse::new("Running from product service")
}

#[utoipa::path(
    get,
    path = "/products/user",
    tag = "Products",
    responses(
        (status = 200, description = "User page", body = MessageResponse),
        (status = 403, description = "Missing ROLE_USER")
    ),
    security(("bearer_auth" = []))
)]
pub async fn products_user(Auth(principal): Auth) -> Json<MessageResponse> {
    MessageResponse::new(format!(
        "Running from product service - User Page - {}",
        principal.display_name()
    ))
}

#[utoipa::path(
    get,
    path = "/products/admin",
    tag = "Products",
    responses(
        (status = 200, description = "Admin page", body = MessageResponse),
        (status = 403, description = "Missing ROLE_ADMIN")
    ),
    security(("bearer_auth" = []))
)]
pub async fn products_admin(Auth(principal): Auth) -> Json<MessageResponse> {
    MessageResponse::new(format!(
        "Running from product service - Admin Page - {}",
        principal.display_name()
    ))
}
