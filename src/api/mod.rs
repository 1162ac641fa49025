// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{auth::enforce, state::AppState};

pub mod demo;
pub mod health;

/// Every route, including health and docs, sits behind the gate. Whether a
/// path is public is decided by the rule table alone.
pub fn router(state: AppState) -> Router {
    let pipeline = state.pipeline.clone();

    let routes = Router::new()
        .route("/", get(demo::home))
        .route("/private", get(demo::private))
        .route("/me", get(demo::me))
        .route("/user", get(demo::user))
        .route("/admin", get(demo::admin))
        .route("/credentials", get(demo::credentials))
        .route("/cart/index", get(demo::cart_index))
        .route("/cart/user", get(demo::cart_user))
        .route("/cart/admin", get(demo::cart_admin))
        .route("/products", get(demo::products))
        .route("/products/user", get(demo::products_user))
        .route("/products/admin", get(demo::products_admin))
        .route("/actuator/health", get(health::health))
        .route("/actuator/health/liveness", get(health::liveness))
        .route("/actuator/health/readiness", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(pipeline, enforce))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("n/a");
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    path = %req.uri().path(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "The requested resource was not found",
            "error_code": "NOT_FOUND"
        })),
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        demo::home,
        demo::private,
        demo::me,
        demo::user,
        demo::admin,
        demo::credentials,
        demo::cart_index,
        demo::cart_user,
        demo::cart_admin,
        demo::products,
        demo::products_user,
        demo::products_admin,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            demo::MessageResponse,
            demo::PrincipalResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Pages", description = "Public and signed-in pages"),
        (name = "Gateway", description = "Role-protected gateway routes"),
        (name = "Cart", description = "Cart service routes"),
        (name = "Products", description = "Product service routes"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
