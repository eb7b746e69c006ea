//! Commerce backend REST API client.
//!
//! # Architecture
//!
//! - The backend owns carts, orders and the shipping-rate table; the
//!   storefront never persists any of them
//! - Plain JSON over `reqwest`, authenticated with the customer's bearer token
//!   (and an optional service key)
//! - Shipping regions are cached in-memory via `moka` (5 minute TTL) so each
//!   checkout page load costs at most one upstream call
//!
//! # Endpoints
//!
//! ```text
//! GET  {api}/provinces   -> { success, data: [ShippingRegion] }
//! GET  {api}/cart        -> { success, data: { items } }
//! POST {api}/orders      -> { orderId, formAction, fields }
//! ```

mod cache;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use himal_core::{CartSnapshot, ShippingRegion};

use cache::{CacheKey, CacheValue};
pub use types::{ApiEnvelope, ApiErrorBody, CreatedOrder, OrderDraft, OrderItem};

/// Message shown when the backend gives no usable explanation.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {}", message.as_deref().unwrap_or("(no message)"))]
    Api {
        status: u16,
        message: Option<String>,
    },

    /// Backend answered 2xx with `success: false`.
    #[error("Request rejected: {}", .0.as_deref().unwrap_or("(no message)"))]
    Rejected(Option<String>),

    /// Response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Cart prices or quantities are too large to total.
    #[error("Cart totals out of range")]
    CartOutOfRange,

    /// Request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Client could not be constructed.
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// Message safe to show a shopper: the backend's own message when it sent
    /// one, otherwise a generic fallback.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api {
                message: Some(message),
                ..
            }
            | Self::Rejected(Some(message)) => message.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// True if the backend rejected the customer's credentials.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}

/// Connection settings for [`BackendClient`].
#[derive(Clone)]
pub struct BackendSettings {
    pub api_url: Url,
    pub api_key: Option<secrecy::SecretString>,
    pub timeout: Duration,
}

impl From<&crate::config::BackendConfig> for BackendSettings {
    fn from(config: &crate::config::BackendConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }
}

// =============================================================================
// BackendClient
// =============================================================================

/// Client for the commerce backend.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    api_url: Url,
    cache: Cache<CacheKey, CacheValue>,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the service key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        if let Some(key) = &settings.api_key {
            let mut value = HeaderValue::from_str(key.expose_secret())
                .map_err(|e| BackendError::Config(format!("Invalid API key format: {e}")))?;
            value.set_sensitive(true);
            headers.insert("X-Api-Key", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                api_url: settings.api_url.clone(),
                cache,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.api_url.join(path)?)
    }

    /// Send a request and decode a 2xx JSON body, mapping everything else to
    /// [`BackendError`].
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            let message = serde_json::from_str::<ApiErrorBody>(&response_text)
                .ok()
                .and_then(ApiErrorBody::into_message);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Unwrap an envelope, treating `success: false` or missing data as a
    /// rejection.
    fn open_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T, BackendError> {
        match envelope {
            ApiEnvelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            ApiEnvelope { message, .. } => Err(BackendError::Rejected(message)),
        }
    }

    // =========================================================================
    // Shipping
    // =========================================================================

    /// List every shipping region with its cities.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend reports failure.
    #[instrument(skip(self))]
    pub async fn list_regions(&self) -> Result<Arc<[ShippingRegion]>, BackendError> {
        if let Some(CacheValue::Regions(regions)) = self.inner.cache.get(&CacheKey::Regions).await
        {
            debug!("Cache hit for shipping regions");
            return Ok(regions);
        }

        let url = self.endpoint("provinces")?;
        let envelope: ApiEnvelope<Vec<ShippingRegion>> =
            self.send_json(self.inner.client.get(url)).await?;
        let regions: Arc<[ShippingRegion]> = Self::open_envelope(envelope)?.into();

        self.inner
            .cache
            .insert(CacheKey::Regions, CacheValue::Regions(Arc::clone(&regions)))
            .await;

        Ok(regions)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Read the customer's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend reports failure.
    #[instrument(skip(self, access_token))]
    pub async fn get_cart(&self, access_token: &str) -> Result<CartSnapshot, BackendError> {
        let url = self.endpoint("cart")?;
        let envelope: ApiEnvelope<CartSnapshot> = self
            .send_json(self.inner.client.get(url).bearer_auth(access_token))
            .await?;
        let cart = Self::open_envelope(envelope)?;

        if cart.checked_subtotal().is_none() {
            warn!(lines = cart.items.len(), "Cart totals overflow");
            return Err(BackendError::CartOutOfRange);
        }
        Ok(cart)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Create an order and receive the payment form parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects the order.
    #[instrument(skip(self, access_token, draft), fields(items = draft.items.len()))]
    pub async fn create_order(
        &self,
        access_token: &str,
        draft: &OrderDraft,
    ) -> Result<CreatedOrder, BackendError> {
        let url = self.endpoint("orders")?;
        let order: CreatedOrder = self
            .send_json(
                self.inner
                    .client
                    .post(url)
                    .bearer_auth(access_token)
                    .json(draft),
            )
            .await?;
        debug!(order_id = %order.order_id, "Order created");
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use himal_core::{FormAddress, ProductId};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BackendClient {
        BackendClient::new(&BackendSettings {
            api_url: Url::parse(&format!("{}/api/", server.uri())).unwrap(),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn regions_body() -> serde_json::Value {
        serde_json::json!({
            "success": true,
            "data": [{
                "_id": "r1",
                "name": "Bagmati",
                "isActive": true,
                "cities": [{ "name": "Kathmandu", "shippingCharge": 100, "isActive": true }]
            }]
        })
    }

    #[test]
    fn test_user_message_prefers_backend_message() {
        let err = BackendError::Api {
            status: 400,
            message: Some("Product out of stock".to_string()),
        };
        assert_eq!(err.user_message(), "Product out of stock");

        let err = BackendError::Api {
            status: 500,
            message: None,
        };
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_is_unauthorized() {
        let err = BackendError::Api {
            status: 401,
            message: None,
        };
        assert!(err.is_unauthorized());
        assert!(!BackendError::Rejected(None).is_unauthorized());
    }

    #[tokio::test]
    async fn test_list_regions_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/provinces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(regions_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.list_regions().await.unwrap();
        let second = client.list_regions().await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "Bagmati");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_list_regions_unsuccessful_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/provinces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "Shipping table unavailable"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).list_regions().await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(Some(_))));
        assert_eq!(err.user_message(), "Shipping table unavailable");
    }

    #[tokio::test]
    async fn test_get_cart_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cart"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "items": [] }
            })))
            .mount(&server)
            .await;

        let cart = client_for(&server).get_cart("tok-1").await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_get_cart_rejects_unpriceable_cart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "items": [{
                    "product": {
                        "_id": "p1",
                        "title": "Pashmina",
                        "originalPrice": "79228162514264337593543950335"
                    },
                    "quantity": 2
                }] }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).get_cart("tok-1").await.unwrap_err();
        assert!(matches!(err, BackendError::CartOutOfRange));
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_create_order_posts_draft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .and(body_partial_json(serde_json::json!({
                "items": [{ "productId": "p1", "quantity": 2 }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "orderId": "o-9",
                "formAction": "https://rc-epay.esewa.com.np/api/epay/main/v2/form",
                "fields": { "total_amount": 1700, "transaction_uuid": "t-9" }
            })))
            .mount(&server)
            .await;

        let draft = OrderDraft {
            items: vec![OrderItem {
                product_id: ProductId::new("p1"),
                quantity: 2,
            }],
            shipping_info: FormAddress::default(),
        };
        let order = client_for(&server).create_order("tok", &draft).await.unwrap();
        assert_eq!(order.order_id.as_str(), "o-9");
        assert_eq!(order.field_text("total_amount").as_deref(), Some("1700"));
    }

    #[tokio::test]
    async fn test_create_order_surfaces_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({ "message": "Insufficient stock" })),
            )
            .mount(&server)
            .await;

        let draft = OrderDraft {
            items: vec![],
            shipping_info: FormAddress::default(),
        };
        let err = client_for(&server)
            .create_order("tok", &draft)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 422, .. }));
        assert_eq!(err.user_message(), "Insufficient stock");
    }
}
