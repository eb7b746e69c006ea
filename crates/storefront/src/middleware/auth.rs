//! Customer authentication extractor.
//!
//! Sign-in itself lives outside the storefront; it leaves a
//! [`CurrentCustomer`] in the session, and checkout routes require one.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{HeaderValue, StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::{CurrentCustomer, session_keys};

/// Where unauthenticated customers are sent.
pub const LOGIN_PATH: &str = "/auth/login";

/// Extractor that requires a signed-in customer.
///
/// # Example
///
/// ```rust,ignore
/// async fn checkout(RequireAuth(customer): RequireAuth) -> impl IntoResponse {
///     format!("Checking out as {}", customer.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentCustomer);

/// Rejection for [`RequireAuth`].
#[derive(Debug)]
pub enum AuthRejection {
    /// Full page request: redirect to sign-in, then back here.
    RedirectToLogin(String),
    /// HTMX request: ask htmx to navigate to sign-in.
    HtmxRedirect(String),
    /// No session layer on this route.
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin(location) => Redirect::to(&location).into_response(),
            Self::HtmxRedirect(location) => {
                let mut response = StatusCode::UNAUTHORIZED.into_response();
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert("hx-redirect", value);
                }
                response
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

/// Sign-in URL that returns to `path` afterwards.
#[must_use]
pub fn login_url(path: &str) -> String {
    let mut url = String::from(LOGIN_PATH);
    url.push_str("?redirect=");
    url.extend(url::form_urlencoded::byte_serialize(path.as_bytes()));
    url
}

/// Path the customer asked for, before any router nesting stripped its prefix.
fn return_path(parts: &Parts) -> &str {
    parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.path(), |original| original.0.path())
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        let customer: Option<CurrentCustomer> = session
            .get(session_keys::CURRENT_CUSTOMER)
            .await
            .ok()
            .flatten();

        customer.map(Self).ok_or_else(|| {
            // Fragments come back to the page, not to themselves.
            let is_htmx = parts.headers.contains_key("hx-request");
            if is_htmx {
                AuthRejection::HtmxRedirect(login_url("/checkout"))
            } else {
                AuthRejection::RedirectToLogin(login_url(return_path(parts)))
            }
        })
    }
}

/// Store the signed-in customer in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_customer(
    session: &Session,
    customer: &CurrentCustomer,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::CURRENT_CUSTOMER, customer)
        .await
}
