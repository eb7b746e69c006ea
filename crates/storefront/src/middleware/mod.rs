//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CSP nonce (generate per-request nonce for inline scripts)
//! 5. Security headers (CSP with nonce and payment origin, framing, caching)
//! 6. Session layer (tower-sessions, in-memory store)
//! 7. Rate limiting (governor, checkout POST routes only)

pub mod auth;
pub mod csp;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{AuthRejection, RequireAuth, login_url, set_current_customer};
pub use csp::{CspNonce, csp_nonce_middleware};
pub use rate_limit::{checkout_fragment_rate_limiter, checkout_submit_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
