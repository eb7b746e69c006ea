//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//!
//! # Checkout (requires auth)
//! GET  /checkout               - Checkout page
//! POST /checkout               - Place order, answer with payment handoff page
//! POST /checkout/region        - Province changed (cities fragment, HTMX)
//! POST /checkout/city          - City changed (summary fragment, HTMX)
//! GET  /checkout/success       - Order confirmation after payment
//! ```

pub mod checkout;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::{checkout_fragment_rate_limiter, checkout_submit_rate_limiter};
use crate::state::AppState;

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    let fragments = checkout_fragment_rate_limiter();

    Router::new()
        .route(
            "/",
            get(checkout::show)
                .merge(post(checkout::submit).layer(checkout_submit_rate_limiter())),
        )
        .route(
            "/region",
            post(checkout::region).layer(fragments.clone()),
        )
        .route("/city", post(checkout::city).layer(fragments))
        .route("/success", get(checkout::success))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/checkout", checkout_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
