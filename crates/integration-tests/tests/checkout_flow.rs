//! End-to-end checkout: page, province and city fragments, order submission
//! and the payment handoff page.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_SECURITY_POLICY, LOCATION};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use himal_core::Price;
use himal_integration_tests::{
    ACCESS_TOKEN, TestContext, created_order, shawl_cart, valid_checkout_form,
};
use himal_storefront::checkout::validation::CITY_MESSAGE;
use himal_storefront::config::CheckoutConfig;

fn rupees(amount: u32) -> String {
    Price::from_whole(amount).display()
}

/// The nonce the page's inline script carries.
fn script_nonce(body: &str) -> Option<&str> {
    let start = body.find("<script nonce=\"")? + "<script nonce=\"".len();
    let end = body.get(start..)?.find('"')? + start;
    body.get(start..end)
}

async fn mount_order(ctx: &TestContext, product_code: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(header("authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .and(body_partial_json(json!({
            "items": [{ "productId": "p-shawl", "quantity": 2 }],
            "shippingInfo": {
                "email": "sita@example.com",
                "province": "Bagmati",
                "city": "Kathmandu",
                "country": "Nepal"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(created_order(product_code)))
        .expect(expected_calls)
        .mount(&ctx.backend)
        .await;
}

#[tokio::test]
async fn test_health_carries_security_headers() {
    let ctx = TestContext::start().await;

    let response = ctx.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().contains_key("x-request-id"));

    let csp = response.headers()[CONTENT_SECURITY_POLICY].to_str().unwrap();
    assert!(csp.contains("form-action 'self' https://rc-epay.esewa.com.np"));
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_checkout_requires_sign_in() {
    let ctx = TestContext::start().await;

    let response = ctx.get("/checkout").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[LOCATION],
        "/auth/login?redirect=%2Fcheckout"
    );

    let response = ctx
        .post_htmx("/checkout/region", &[("province", "Bagmati")])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()["hx-redirect"],
        "/auth/login?redirect=%2Fcheckout"
    );
}

#[tokio::test]
async fn test_empty_cart_goes_back_to_cart() {
    let ctx = TestContext::start().await;
    ctx.mount_regions().await;
    ctx.mount_cart(json!([])).await;
    ctx.sign_in().await;

    let response = ctx.get("/checkout").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/cart");
}

#[tokio::test]
async fn test_full_checkout_hands_off_to_payment() {
    let ctx = TestContext::start().await;
    ctx.mount_regions().await;
    ctx.mount_cart(shawl_cart()).await;
    mount_order(&ctx, "EPAYTEST", 1).await;
    ctx.sign_in().await;

    // Page: discounted lines, no shipping yet, submit disabled
    let response = ctx.get("/checkout").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Pashmina Shawl"));
    assert!(body.contains(&rupees(1600)));
    assert!(body.contains("Select a city"));
    assert!(body.contains("value=\"sita@example.com\""));
    assert!(body.contains(" disabled"));

    // Province: Bagmati offers its active cities only
    let response = ctx
        .post_htmx("/checkout/region", &[("province", "Bagmati")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Kathmandu"));
    assert!(body.contains("Lalitpur"));
    assert!(!body.contains("Sindhuli"));
    assert!(!body.contains("Pokhara"));
    assert!(body.contains("hx-swap-oob"));

    // City: flat charge lands in the summary
    let response = ctx
        .post_htmx(
            "/checkout/city",
            &[("province", "Bagmati"), ("city", "Kathmandu")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains(&rupees(100)));
    assert!(body.contains(&rupees(1700)));
    assert!(!body.contains(" disabled"));

    // Submit: order created, handoff page posts to eSewa
    let response = ctx.post_form("/checkout", &valid_checkout_form()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let csp = response.headers()[CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .to_string();
    let body = response.text().await.unwrap();

    assert!(body.contains("method=\"POST\""));
    assert!(body.contains("rc-epay.esewa.com.np"));
    assert!(body.contains("name=\"csrf_token\""));
    assert!(body.contains("name=\"total_amount\" value=\"1700\""));
    assert!(body.contains("name=\"transaction_uuid\" value=\"txn-1001\""));
    assert!(body.contains("name=\"product_code\" value=\"EPAYTEST\""));

    let nonce = script_nonce(&body).unwrap();
    assert!(csp.contains(&format!("'nonce-{nonce}'")));

    // The success page reads the pending order from the session
    let response = ctx.get("/checkout/success").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("o-1001"));
    assert!(body.contains(&rupees(1700)));
    assert!(body.contains("Thamel Marg"));
}

#[tokio::test]
async fn test_handoff_strips_angle_brackets() {
    let ctx = TestContext::start().await;
    ctx.mount_regions().await;
    ctx.mount_cart(shawl_cart()).await;
    mount_order(&ctx, "<<EPAYTEST>>", 1).await;
    ctx.sign_in().await;

    let response = ctx.post_form("/checkout", &valid_checkout_form()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();

    assert!(body.contains("name=\"product_code\" value=\"EPAYTEST\""));
    assert!(!body.contains("&lt;") && !body.contains("&#60;"));
}

#[tokio::test]
async fn test_submit_without_city_is_blocked() {
    let ctx = TestContext::start().await;
    ctx.mount_regions().await;
    ctx.mount_cart(shawl_cart()).await;
    mount_order(&ctx, "EPAYTEST", 0).await;
    ctx.sign_in().await;

    let form: Vec<(&str, &str)> = valid_checkout_form()
        .into_iter()
        .filter(|(name, _)| *name != "city")
        .collect();

    let response = ctx.post_form("/checkout", &form).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.text().await.unwrap();
    assert!(body.contains(CITY_MESSAGE));
    assert!(body.contains("value=\"Sita\""));
}

#[tokio::test]
async fn test_unknown_city_for_province_is_dropped() {
    let ctx = TestContext::start().await;
    ctx.mount_regions().await;
    ctx.mount_cart(shawl_cart()).await;
    mount_order(&ctx, "EPAYTEST", 0).await;
    ctx.sign_in().await;

    let form: Vec<(&str, &str)> = valid_checkout_form()
        .into_iter()
        .map(|(name, value)| if name == "city" { (name, "Pokhara") } else { (name, value) })
        .collect();

    let response = ctx.post_form("/checkout", &form).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.text().await.unwrap().contains(CITY_MESSAGE));
}

#[tokio::test]
async fn test_payment_attempts_are_limited() {
    let ctx = TestContext::with_checkout(CheckoutConfig {
        max_attempts: 1,
        window: Duration::from_secs(15 * 60),
        reset_limit_on_success: false,
    })
    .await;
    ctx.mount_regions().await;
    ctx.mount_cart(shawl_cart()).await;
    mount_order(&ctx, "EPAYTEST", 1).await;
    ctx.sign_in().await;

    let first = ctx.post_form("/checkout", &valid_checkout_form()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = ctx.post_form("/checkout", &valid_checkout_form()).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = second.text().await.unwrap();
    assert!(body.contains("Too many payment attempts"));
}

#[tokio::test]
async fn test_backend_rejection_is_shown_on_the_form() {
    let ctx = TestContext::start().await;
    ctx.mount_regions().await;
    ctx.mount_cart(shawl_cart()).await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Insufficient stock" })),
        )
        .mount(&ctx.backend)
        .await;
    ctx.sign_in().await;

    let response = ctx.post_form("/checkout", &valid_checkout_form()).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.text().await.unwrap().contains("Insufficient stock"));
}

#[tokio::test]
async fn test_expired_backend_token_sends_customer_to_sign_in() {
    let ctx = TestContext::start().await;
    ctx.mount_regions().await;
    ctx.mount_cart(shawl_cart()).await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "jwt expired" })))
        .mount(&ctx.backend)
        .await;
    ctx.sign_in().await;

    let response = ctx.post_form("/checkout", &valid_checkout_form()).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[LOCATION],
        "/auth/login?redirect=%2Fcheckout"
    );
}

#[tokio::test]
async fn test_missing_regions_disable_shipping() {
    let ctx = TestContext::start().await;
    ctx.mount_cart(shawl_cart()).await;
    Mock::given(method("GET"))
        .and(path("/api/provinces"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.backend)
        .await;
    ctx.sign_in().await;

    let response = ctx.get("/checkout").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Unable to load shipping options"));
}
