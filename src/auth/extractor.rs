// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the authenticated principal.
//!
//! The pipeline middleware stores the [`Principal`] in request extensions
//! after a successful check. Handlers read it back:
//!
//! ```rust,ignore
//! async fn admin_page(Auth(principal): Auth) -> String {
//!     format!("Hello {}", principal.display_name())
//! }
//! ```
//!
//! Role checks do not belong here; they live in the rule table.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, Principal};

/// Extractor for the authenticated principal.
///
/// Rejects with 401 when the request carries no principal, e.g. on a public
/// route reached anonymously.
pub struct Auth(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Auth)
            .ok_or(AuthError::AuthenticationRequired)
    }
}

/// Optional principal extractor.
///
/// Returns `None` for anonymous requests instead of rejecting. Used by public
/// pages that show user details when someone is signed in.
pub struct OptionalAuth(pub Option<Principal>);

impl<S: Send + Sync> FromRequestParts<S> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(parts.extensions.get::<Principal>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::to_authorities;
    use axum::http::Request;

    fn parts() -> Parts {
        Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn auth_requires_principal_in_extensions() {
        let mut parts = parts();
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn auth_reads_principal_from_extensions() {
        let mut parts = parts();
        parts
            .extensions
            .insert(Principal::new("user_from_middleware", to_authorities(["admin"])));

        let Auth(principal) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(principal.subject, "user_from_middleware");
    }

    #[tokio::test]
    async fn optional_auth_returns_none_without_principal() {
        let mut parts = parts();
        let OptionalAuth(principal) = OptionalAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn optional_auth_returns_principal_when_present() {
        let mut parts = parts();
        parts.extensions.insert(Principal::new("u1", Default::default()));

        let OptionalAuth(principal) = OptionalAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(principal.unwrap().subject, "u1");
    }
}
