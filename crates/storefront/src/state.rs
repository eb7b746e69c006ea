//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{BackendClient, BackendError, BackendSettings};
use crate::checkout::{AttemptLimiter, CheckoutService};
use crate::config::StorefrontConfig;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// configuration, the backend client and the checkout service.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: BackendClient,
    checkout: CheckoutService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be constructed.
    pub fn new(config: StorefrontConfig) -> Result<Self, BackendError> {
        let backend = BackendClient::new(&BackendSettings::from(&config.backend))?;
        let checkout = CheckoutService::new(
            backend.clone(),
            AttemptLimiter::from_config(&config.checkout),
            config.checkout.reset_limit_on_success,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                checkout,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the commerce backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Get a reference to the checkout service.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }
}
