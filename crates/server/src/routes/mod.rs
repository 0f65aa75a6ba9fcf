//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness check
//! GET  /health/ready                 - Readiness check (store reachable)
//!
//! # Users (rate limited)
//! POST /api/users/signin             - Sign in, returns profile + token
//! POST /api/users/signup             - Register, returns profile + token
//! POST /api/users/forget-password    - Email a reset link
//! POST /api/users/reset-password     - Exchange reset token for new password
//!
//! # Orders (bearer token)
//! GET  /api/orders?userId=           - All orders or one buyer's (seller/admin)
//! POST /api/orders                   - Place an order
//! GET  /api/orders/summary           - Dashboard aggregates (seller/admin)
//! GET  /api/orders/mine              - Caller's orders
//! GET  /api/orders/{id}              - One order
//! PUT  /api/orders/{id}/deliver      - Mark delivered (seller/admin)
//! ```

pub mod health;
pub mod orders;
pub mod users;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::config::ServerConfig;
use crate::middleware::{auth_rate_limiter, json_error_body, request_id_middleware};
use crate::state::AppState;

/// Body of every response that only carries a message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Create the user routes router.
pub fn user_routes(config: &ServerConfig) -> Router<AppState> {
    let router = Router::new()
        .route("/signin", post(users::signin))
        .route("/signup", post(users::signup))
        .route("/forget-password", post(users::forget_password))
        .route("/reset-password", post(users::reset_password));

    if config.rate_limit_auth {
        router.layer(auth_rate_limiter(&config.trusted_proxies))
    } else {
        router
    }
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list).post(orders::create))
        .route("/summary", get(orders::summary))
        .route("/mine", get(orders::mine))
        .route("/{id}", get(orders::show))
        .route("/{id}/deliver", put(orders::deliver))
}

/// Build the complete application: routes, middleware and state.
pub fn app(state: AppState) -> Router {
    let request_timeout = state.config().request_timeout;

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(request_timeout);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/users", user_routes(state.config()))
        .nest("/api/orders", order_routes())
        .layer(timeout)
        .layer(middleware::map_response(json_error_body))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
