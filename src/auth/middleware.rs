// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request pipeline: token → principal → gate decision.
//!
//! [`enforce`] is the axum middleware. It runs for every request, before any
//! handler:
//!
//! 1. Take the bearer token from `Authorization: Bearer <token>`, or from the
//!    configured session cookie
//! 2. Verify it with the configured [`TokenVerifier`] under a timeout
//! 3. Build the [`Principal`] from the claims
//! 4. Ask the rule store for a [`Decision`]
//!
//! Any verification failure (missing, malformed, expired, wrong signature,
//! timeout) leaves the principal absent; the gate then decides as for an
//! anonymous request. Allowed requests carry the principal in their
//! extensions for the [`Auth`](super::Auth) extractor.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/admin", get(admin))
//!     .layer(axum::middleware::from_fn_with_state(pipeline, enforce));
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{
        header::{ACCEPT, AUTHORIZATION, COOKIE},
        HeaderMap, Method,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, info, warn};

use super::claims::{Principal, RoleSource};
use super::error::AuthError;
use super::verifier::TokenVerifier;
use crate::gate::{Decision, RuleStore};

/// Default time allowed for token verification.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Default `resource_access` client key, as used by the Keycloak demo realm.
pub const DEFAULT_CLIENT_ID: &str = "spring-client";

/// Per-deployment pipeline options.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Where roles live in the claims
    pub role_source: RoleSource,
    /// Cookie carrying the token for browser clients
    pub session_cookie: Option<String>,
    /// Redirect target for challenged browser requests
    pub login_url: Option<String>,
    /// Upper bound on token verification
    pub validation_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            role_source: RoleSource::new(DEFAULT_CLIENT_ID),
            session_cookie: None,
            login_url: None,
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }
}

struct Inner {
    rules: RuleStore,
    verifier: Arc<dyn TokenVerifier>,
    settings: PipelineSettings,
}

/// Everything the middleware needs, cheap to clone.
#[derive(Clone)]
pub struct GatePipeline {
    inner: Arc<Inner>,
}

impl GatePipeline {
    pub fn new(
        rules: RuleStore,
        verifier: Arc<dyn TokenVerifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                rules,
                verifier,
                settings,
            }),
        }
    }

    pub fn rules(&self) -> &RuleStore {
        &self.inner.rules
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    pub fn verifier_name(&self) -> &'static str {
        self.inner.verifier.name()
    }

    /// Token presented by the request, header first, then session cookie.
    pub fn token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        bearer_token(headers).or_else(|| {
            self.inner
                .settings
                .session_cookie
                .as_deref()
                .and_then(|name| cookie_token(headers, name))
        })
    }

    /// Authenticated principal for the request, or `None` when no token was
    /// presented or it did not verify.
    pub async fn resolve_principal(&self, headers: &HeaderMap) -> Option<Principal> {
        let token = self.token(headers)?;
        let settings = &self.inner.settings;

        let verified =
            tokio::time::timeout(settings.validation_timeout, self.inner.verifier.verify(token))
                .await
                .unwrap_or(Err(AuthError::ValidationTimeout));

        let claims = match verified {
            Ok(claims) => claims,
            Err(AuthError::ValidationTimeout) => {
                warn!(
                    verifier = self.inner.verifier.name(),
                    timeout_ms = settings.validation_timeout.as_millis() as u64,
                    error_code = AuthError::ValidationTimeout.error_code(),
                    "Token validation timed out"
                );
                return None;
            }
            Err(e) => {
                log_rejected_token(&e);
                return None;
            }
        };

        match Principal::from_claims(&claims, &settings.role_source) {
            Ok(principal) => Some(principal),
            Err(e) => {
                log_rejected_token(&e);
                None
            }
        }
    }

    /// Full pipeline decision for a request, without axum plumbing.
    pub async fn check(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> (Decision, Option<Principal>) {
        let principal = self.resolve_principal(headers).await;
        let decision = self.inner.rules.authorize(path, method, principal.as_ref());
        (decision, principal)
    }

    /// Response for a refused request.
    pub fn rejection(&self, decision: Decision, headers: &HeaderMap) -> Response {
        match decision {
            Decision::Deny => AuthError::InsufficientPermissions.into_response(),
            Decision::Challenge => match &self.inner.settings.login_url {
                Some(login) if accepts_html(headers) => Redirect::to(login).into_response(),
                _ => AuthError::AuthenticationRequired.into_response(),
            },
            Decision::Allow => AuthError::InternalError(
                "allowed request passed to rejection".to_string(),
            )
            .into_response(),
        }
    }
}

fn log_rejected_token(e: &AuthError) {
    debug!(error_code = e.error_code(), error = %e, "Token rejected, treating request as anonymous");
}

/// Authorization middleware function.
pub async fn enforce(
    State(pipeline): State<GatePipeline>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let (decision, principal) = pipeline.check(&method, &path, request.headers()).await;

    match decision {
        Decision::Allow => {
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
        Decision::Deny => {
            info!(
                %method,
                path = %path,
                subject = ?principal.as_ref().map(|p| p.subject.as_str()),
                "Access denied"
            );
            pipeline.rejection(decision, request.headers())
        }
        Decision::Challenge => {
            debug!(%method, path = %path, "Authentication required");
            pipeline.rejection(decision, request.headers())
        }
    }
}

/// Token from an `Authorization: Bearer` header. Other schemes are ignored.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Value of the cookie `name` across all `Cookie` headers.
pub fn cookie_token<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{sign, token_for, TEST_SECRET};
    use crate::auth::verifier::{ClaimChecks, SharedSecretVerifier};
    use crate::auth::{Auth, TokenClaims};
    use crate::gate::{Rule, RuleTable};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header::WWW_AUTHENTICATE, Request as HttpRequest, StatusCode},
        routing::get,
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn table() -> RuleTable {
        RuleTable::new(vec![
            Rule::public("/").unwrap(),
            Rule::authority("/admin", "ADMIN").unwrap(),
            Rule::authenticated("*").unwrap(),
        ])
    }

    fn pipeline_with(settings: PipelineSettings) -> GatePipeline {
        GatePipeline::new(
            RuleStore::new(table()),
            Arc::new(SharedSecretVerifier::new(TEST_SECRET, ClaimChecks::default())),
            settings,
        )
    }

    fn pipeline() -> GatePipeline {
        pipeline_with(PipelineSettings::default())
    }

    async fn whoami(Auth(principal): Auth) -> String {
        principal.subject
    }

    fn app(pipeline: GatePipeline) -> Router {
        Router::new()
            .route("/", get(|| async { "home" }))
            .route("/status", get(|| async { "up" }))
            .route("/admin", get(whoami))
            .route("/private", get(whoami))
            .layer(axum::middleware::from_fn_with_state(pipeline, enforce))
    }

    fn get_with(path: &str, headers: &[(&str, String)]) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {token}"))
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn public_root_needs_no_token() {
        let response = app(pipeline()).oneshot(get_with("/", &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "home");
    }

    #[tokio::test]
    async fn admin_route_refuses_user() {
        let token = token_for("bob", &["user"], 300);
        let response = app(pipeline())
            .oneshot(get_with("/admin", &[bearer(&token)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error_code"], "insufficient_permissions");
    }

    #[tokio::test]
    async fn admin_route_forwards_admin_with_principal() {
        let token = token_for("alice", &["admin"], 300);
        let response = app(pipeline())
            .oneshot(get_with("/admin", &[bearer(&token)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "alice");
    }

    #[tokio::test]
    async fn anonymous_private_request_is_challenged() {
        let response = app(pipeline()).oneshot(get_with("/private", &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }

    #[tokio::test]
    async fn expired_token_behaves_like_no_token() {
        let expired = token_for("alice", &["admin"], -3600);

        for path in ["/", "/admin", "/private"] {
            let anonymous = app(pipeline()).oneshot(get_with(path, &[])).await.unwrap();
            let with_expired = app(pipeline())
                .oneshot(get_with(path, &[bearer(&expired)]))
                .await
                .unwrap();
            assert_eq!(anonymous.status(), with_expired.status(), "path {path}");
        }
    }

    #[tokio::test]
    async fn forged_token_behaves_like_no_token() {
        let forged = crate::auth::testing::sign_with_secret(
            &json!({ "sub": "mallory", "exp": chrono::Utc::now().timestamp() + 300,
                     "resource_access": { "spring-client": { "roles": ["admin"] } } }),
            b"guessed",
        );
        let response = app(pipeline())
            .oneshot(get_with("/admin", &[bearer(&forged)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_without_subject_is_anonymous() {
        let token = sign(&json!({ "exp": chrono::Utc::now().timestamp() + 300 }));
        let headers: HeaderMap = HeaderMap::from_iter([(
            AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        )]);
        let (decision, principal) = pipeline().check(&Method::GET, "/private", &headers).await;
        assert_eq!(decision, Decision::Challenge);
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn session_cookie_is_accepted_when_configured() {
        let token = token_for("carol", &["user"], 300);
        let cookie = ("Cookie", format!("theme=dark; access_token={token}"));

        let without = app(pipeline())
            .oneshot(get_with("/private", &[cookie.clone()]))
            .await
            .unwrap();
        assert_eq!(without.status(), StatusCode::UNAUTHORIZED);

        let settings = PipelineSettings {
            session_cookie: Some("access_token".into()),
            ..PipelineSettings::default()
        };
        let with = app(pipeline_with(settings))
            .oneshot(get_with("/private", &[cookie]))
            .await
            .unwrap();
        assert_eq!(with.status(), StatusCode::OK);
        assert_eq!(body_string(with).await, "carol");
    }

    #[tokio::test]
    async fn browser_challenge_redirects_to_login() {
        let settings = PipelineSettings {
            login_url: Some("https://sso.example.com/login".into()),
            ..PipelineSettings::default()
        };
        let app = app(pipeline_with(settings));

        let browser = app
            .clone()
            .oneshot(get_with("/private", &[("Accept", "text/html,*/*".into())]))
            .await
            .unwrap();
        assert_eq!(browser.status(), StatusCode::SEE_OTHER);
        assert_eq!(browser.headers()["location"], "https://sso.example.com/login");

        let api = app
            .oneshot(get_with("/private", &[("Accept", "application/json".into())]))
            .await
            .unwrap();
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
    }

    struct SlowVerifier;

    #[async_trait]
    impl TokenVerifier for SlowVerifier {
        async fn verify(&self, _token: &str) -> Result<TokenClaims, AuthError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(TokenClaims::from_value(json!({
                "sub": "late",
                "resource_access": { "spring-client": { "roles": ["admin"] } }
            })))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn verifier_timeout_behaves_like_no_token() {
        let pipeline = GatePipeline::new(
            RuleStore::new(table()),
            Arc::new(SlowVerifier),
            PipelineSettings {
                validation_timeout: Duration::from_millis(20),
                ..PipelineSettings::default()
            },
        );
        let headers: HeaderMap =
            HeaderMap::from_iter([(AUTHORIZATION, "Bearer anything".parse().unwrap())]);

        let (admin, principal) = pipeline.check(&Method::GET, "/admin", &headers).await;
        assert_eq!(admin, Decision::Challenge);
        assert!(principal.is_none());

        let (root, _) = pipeline.check(&Method::GET, "/", &headers).await;
        assert_eq!(root, Decision::Allow);
    }

    #[test]
    fn bearer_token_parsing() {
        let header =
            |v: &str| -> HeaderMap { HeaderMap::from_iter([(AUTHORIZATION, v.parse().unwrap())]) };

        assert_eq!(bearer_token(&header("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&header("bearer abc ")), Some("abc"));
        assert_eq!(bearer_token(&header("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&header("Bearer ")), None);
        assert_eq!(bearer_token(&header("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, "a=1; session=\"tok\"".parse().unwrap());
        headers.append(COOKIE, "other=2".parse().unwrap());

        assert_eq!(cookie_token(&headers, "session"), Some("tok"));
        assert_eq!(cookie_token(&headers, "other"), Some("2"));
        assert_eq!(cookie_token(&headers, "missing"), None);
        assert_eq!(cookie_token(&headers, "ses"), None);
    }

    #[test]
    fn header_token_wins_over_cookie() {
        let pipeline = pipeline_with(PipelineSettings {
            session_cookie: Some("session".into()),
            ..PipelineSettings::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        headers.insert(COOKIE, "session=from-cookie".parse().unwrap());
        assert_eq!(pipeline.token(&headers), Some("from-header"));

        headers.remove(AUTHORIZATION);
        assert_eq!(pipeline.token(&headers), Some("from-cookie"));
    }

    #[tokio::test]
    async fn rule_reload_takes_effect_for_next_request() {
        let pipeline = pipeline();
        let app = app(pipeline.clone());

        let before = app.clone().oneshot(get_with("/status", &[])).await.unwrap();
        assert_eq!(before.status(), StatusCode::UNAUTHORIZED);

        pipeline
            .rules()
            .replace(RuleTable::new(vec![Rule::public("/**").unwrap()]));
        let after = app.oneshot(get_with("/status", &[])).await.unwrap();
        assert_eq!(after.status(), StatusCode::OK);
    }
}
