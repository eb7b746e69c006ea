//! Himal Bazaar checkout storefront library.
//!
//! This crate provides the checkout flow as a library, allowing it to be
//! tested and reused. The binary in `main.rs` only loads configuration,
//! installs telemetry and serves [`app`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod checkout;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

use axum::{Router, extract::Request};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the storefront router with its full middleware stack.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// rate limiters can fall back to the peer address.
pub fn app(state: AppState) -> Router {
    with_middleware(routes::routes(), state)
}

/// Wrap `routes` in the storefront middleware stack and attach `state`.
pub fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    routes
        .layer(session_layer)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::csp_nonce_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
