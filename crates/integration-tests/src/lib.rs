//! Integration tests for the Himal Bazaar checkout storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p himal-integration-tests
//! ```
//!
//! Each test starts the real storefront router on an ephemeral port with a
//! wiremock server standing in for the commerce backend. Sign-in lives
//! outside the storefront, so [`TestContext`] mounts one extra route that
//! writes a [`CurrentCustomer`] into the session.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{Json, http::StatusCode, routing::post};
use reqwest::{Client, Response, redirect::Policy};
use serde_json::{Value, json};
use tower_sessions::Session;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use himal_core::UserId;
use himal_storefront::config::{
    BackendConfig, CheckoutConfig, DEFAULT_PAYMENT_FORM_ORIGIN, PaymentConfig, StorefrontConfig,
};
use himal_storefront::middleware::set_current_customer;
use himal_storefront::models::{AccessToken, CurrentCustomer};
use himal_storefront::state::AppState;

/// Test-only sign-in route.
pub const TEST_LOGIN_PATH: &str = "/test/login";

/// eSewa form endpoint returned by the mocked order API.
pub const PAYMENT_FORM_ACTION: &str = "https://rc-epay.esewa.com.np/api/epay/main/v2/form";

/// Bearer token of [`customer`].
pub const ACCESS_TOKEN: &str = "tok-sita";

/// A running storefront plus its mocked backend.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub backend: MockServer,
}

impl TestContext {
    /// Start with default attempt limiting.
    pub async fn start() -> Self {
        Self::with_checkout(CheckoutConfig::default()).await
    }

    /// Start with custom attempt limiting.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be started.
    pub async fn with_checkout(checkout: CheckoutConfig) -> Self {
        let backend = MockServer::start().await;

        let config = StorefrontConfig {
            host: [127, 0, 0, 1].into(),
            port: 0,
            base_url: "http://127.0.0.1".to_string(),
            backend: BackendConfig {
                api_url: Url::parse(&format!("{}/api/", backend.uri()))
                    .expect("Invalid mock backend URL"),
                api_key: None,
                timeout: Duration::from_secs(5),
            },
            payment: PaymentConfig {
                form_origin: Url::parse(DEFAULT_PAYMENT_FORM_ORIGIN)
                    .expect("Invalid payment origin"),
            },
            checkout,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        };

        let state = AppState::new(config).expect("Failed to build application state");
        let routes = himal_storefront::routes::routes().route(TEST_LOGIN_PATH, post(test_login));
        let app = himal_storefront::with_middleware(routes, state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
        });

        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: format!("http://{addr}"),
            backend,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Put [`customer`] in this client's session.
    ///
    /// # Panics
    ///
    /// Panics if the sign-in request fails.
    pub async fn sign_in(&self) {
        let response = self
            .client
            .post(self.url(TEST_LOGIN_PATH))
            .json(&customer())
            .send()
            .await
            .expect("Sign-in request failed");
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    }

    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// Post a form as a full page request.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Response {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .expect("POST request failed")
    }

    /// Post a form the way htmx does.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn post_htmx(&self, path: &str, form: &[(&str, &str)]) -> Response {
        self.client
            .post(self.url(path))
            .header("hx-request", "true")
            .form(form)
            .send()
            .await
            .expect("HTMX request failed")
    }

    /// Serve the shipping regions used throughout the tests.
    pub async fn mount_regions(&self) {
        Mock::given(method("GET"))
            .and(path("/api/provinces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(regions_body()))
            .mount(&self.backend)
            .await;
    }

    /// Serve `items` as the customer's cart.
    pub async fn mount_cart(&self, items: Value) {
        Mock::given(method("GET"))
            .and(path("/api/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "items": items }
            })))
            .mount(&self.backend)
            .await;
    }
}

async fn test_login(session: Session, Json(customer): Json<CurrentCustomer>) -> StatusCode {
    match set_current_customer(&session, &customer).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The signed-in customer used by every test.
#[must_use]
pub fn customer() -> CurrentCustomer {
    CurrentCustomer {
        id: UserId::new("u-sita"),
        email: "sita@example.com".to_string(),
        access_token: AccessToken::new(ACCESS_TOKEN),
    }
}

/// Bagmati (Kathmandu 100, Lalitpur 120, Sindhuli inactive) and Gandaki
/// (Pokhara 150).
#[must_use]
pub fn regions_body() -> Value {
    json!({
        "success": true,
        "data": [
            {
                "_id": "r-bagmati",
                "name": "Bagmati",
                "isActive": true,
                "cities": [
                    { "name": "Kathmandu", "shippingCharge": 100, "isActive": true },
                    { "name": "Lalitpur", "shippingCharge": 120, "isActive": true },
                    { "name": "Sindhuli", "shippingCharge": 250, "isActive": false }
                ]
            },
            {
                "_id": "r-gandaki",
                "name": "Gandaki",
                "isActive": true,
                "cities": [
                    { "name": "Pokhara", "shippingCharge": 150, "isActive": true }
                ]
            }
        ]
    })
}

/// One shawl listed at 1000, discounted to 800, quantity 2.
#[must_use]
pub fn shawl_cart() -> Value {
    json!([{
        "product": {
            "_id": "p-shawl",
            "title": "Pashmina Shawl",
            "images": ["https://cdn.example.com/shawl.jpg"],
            "originalPrice": 1000,
            "discountPrice": 800
        },
        "quantity": 2
    }])
}

/// Order creation response for the shawl cart shipped to Kathmandu.
#[must_use]
pub fn created_order(product_code: &str) -> Value {
    json!({
        "orderId": "o-1001",
        "formAction": PAYMENT_FORM_ACTION,
        "fields": {
            "amount": 1600,
            "tax_amount": 0,
            "product_service_charge": 0,
            "product_delivery_charge": 100,
            "total_amount": 1700,
            "transaction_uuid": "txn-1001",
            "product_code": product_code,
            "signed_field_names": "total_amount,transaction_uuid,product_code",
            "signature": "c2lnbmF0dXJl"
        }
    })
}

/// A complete, valid checkout form for Kathmandu.
#[must_use]
pub fn valid_checkout_form() -> Vec<(&'static str, &'static str)> {
    vec![
        ("first_name", "Sita"),
        ("last_name", "Sharma"),
        ("email", "Sita@Example.com"),
        ("phone", "9841234567"),
        ("address", "Thamel Marg"),
        ("province", "Bagmati"),
        ("city", "Kathmandu"),
        ("postal_code", "44600"),
        ("same_as_shipping", "on"),
    ]
}
