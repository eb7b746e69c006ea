//! Session-related types.
//!
//! Types stored in the session for authentication and checkout state.

use core::fmt;

use serde::{Deserialize, Serialize};

use himal_core::UserId;

/// Backend bearer token issued to a signed-in customer.
///
/// Serialized as a plain string so it survives the session store; `Debug`
/// never prints it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Session-stored customer identity.
///
/// Written by the sign-in flow; checkout only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentCustomer {
    /// Backend user ID, also the payment attempt limiter key.
    pub id: UserId,
    pub email: String,
    pub access_token: AccessToken,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in customer.
    pub const CURRENT_CUSTOMER: &str = "current_customer";

    /// Key for the order awaiting payment, read by the success page.
    pub const PENDING_ORDER: &str = "pendingOrder";
}
