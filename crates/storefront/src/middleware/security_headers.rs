//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! Adds restrictive security headers to all responses. The CSP is built per
//! request: inline scripts need the request's nonce, and `form-action` must
//! admit the payment processor the handoff page posts to.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

use crate::middleware::CspNonce;
use crate::state::AppState;

/// The one third-party script: htmx, pinned to a version. `base.html` loads
/// it with [`HTMX_INTEGRITY`].
pub const HTMX_SCRIPT_URL: &str = "https://unpkg.com/htmx.org@2.0.4/dist/htmx.min.js";

/// Subresource integrity hash of [`HTMX_SCRIPT_URL`].
pub const HTMX_INTEGRITY: &str =
    "sha384-HGfztofotfshcF7+8n44JQL2oJmowVChPTg48S+jvZoztPfvwD79OC/LTtG6dMp+";

/// Fallback used if the dynamic policy cannot be encoded as a header.
const LOCKED_DOWN_CSP: &str = "default-src 'none'; script-src 'self'; style-src 'self'; \
     form-action 'self'; frame-ancestors 'none'; base-uri 'self'";

/// Build the Content Security Policy.
///
/// ```text
/// default-src 'none';
/// script-src 'self' 'nonce-<nonce>' https://unpkg.com/htmx.org@2.0.4/dist/htmx.min.js;
/// style-src 'self';
/// img-src 'self' https: data:;
/// connect-src 'self';
/// frame-src 'none';
/// object-src 'none';
/// base-uri 'self';
/// form-action 'self' <payment origin>;
/// frame-ancestors 'none';
/// upgrade-insecure-requests
/// ```
#[must_use]
pub fn content_security_policy(nonce: Option<&str>, payment_origin: &str) -> String {
    let nonce_source = nonce
        .filter(|n| !n.is_empty())
        .map(|n| format!(" 'nonce-{n}'"))
        .unwrap_or_default();

    format!(
        "default-src 'none'; \
         script-src 'self'{nonce_source} {HTMX_SCRIPT_URL}; \
         style-src 'self'; \
         img-src 'self' https: data:; \
         connect-src 'self'; \
         frame-src 'none'; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self' {payment_origin}; \
         frame-ancestors 'none'; \
         upgrade-insecure-requests"
    )
}

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY` - Prevent clickjacking
/// - `X-Content-Type-Options: nosniff` - Prevent MIME sniffing
/// - `Referrer-Policy: no-referrer` - Zero referrer leakage
/// - `Content-Security-Policy` - See [`content_security_policy`]
/// - `Permissions-Policy` - Deny sensitive features
/// - `Cache-Control: no-store, max-age=0` - Checkout pages carry personal data
/// - `Cross-Origin-Opener-Policy: same-origin` - Process isolation
/// - `Cross-Origin-Resource-Policy: same-origin` - Resource isolation
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let nonce = request
        .extensions()
        .get::<CspNonce>()
        .map(|n| n.value().to_owned());
    let csp = content_security_policy(nonce.as_deref(), &state.config().payment.csp_source());

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    let csp_value = HeaderValue::from_str(&csp).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid CSP header value, using locked-down policy");
        HeaderValue::from_static(LOCKED_DOWN_CSP)
    });
    headers.insert(CONTENT_SECURITY_POLICY, csp_value);

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "accelerometer=(), \
             camera=(), \
             display-capture=(), \
             geolocation=(), \
             gyroscope=(), \
             magnetometer=(), \
             microphone=(), \
             payment=(), \
             usb=()",
        ),
    );

    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=0"));

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );

    response
}
