//! Payment handoff: the one-time POST form that carries the customer to the
//! payment processor.
//!
//! Building the form is pure ([`PaymentHandoff::build`]); executing it renders
//! a page whose only job is to submit that form. Security events are logged
//! under the `security` target with the action, field count and whether a
//! token is present. Field values and the token itself are never logged.

use askama::Template;
use axum::response::Html;
use rand::RngCore;
use thiserror::Error;
use url::Url;

/// Hidden input carrying the anti-forgery token.
pub const CSRF_FIELD: &str = "csrf_token";

/// Errors building or rendering a payment handoff.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("invalid payment form action: {0}")]
    InvalidAction(#[from] url::ParseError),

    #[error("payment form action must be http or https, got {0}")]
    UnsupportedScheme(String),

    #[error("failed to render payment form: {0}")]
    Render(#[from] askama::Error),
}

/// 32 random bytes, hex encoded.
#[must_use]
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Strip angle brackets, then surrounding whitespace.
#[must_use]
pub fn sanitize_value(value: &str) -> String {
    value.replace(['<', '>'], "").trim().to_owned()
}

/// A POST form ready to hand to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandoff {
    action: Url,
    fields: Vec<(String, String)>,
}

impl PaymentHandoff {
    /// Always `POST`.
    pub const METHOD: &'static str = "POST";

    /// Describe the form: the anti-forgery token first, then every field with
    /// its value sanitized. A token is generated when none is given.
    ///
    /// # Errors
    ///
    /// Returns an error if `form_action` is not an absolute http(s) URL.
    pub fn build<I>(
        form_action: &str,
        fields: I,
        csrf_token: Option<String>,
    ) -> Result<Self, HandoffError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let action = parse_action(form_action).inspect_err(|e| {
            tracing::error!(
                target: "security",
                event = "payment_handoff_error",
                error = %e,
                "Rejected payment form action"
            );
        })?;

        let token = csrf_token.unwrap_or_else(generate_csrf_token);
        let fields = std::iter::once((CSRF_FIELD.to_owned(), sanitize_value(&token)))
            .chain(
                fields
                    .into_iter()
                    .filter(|(name, _)| name != CSRF_FIELD)
                    .map(|(name, value)| (name, sanitize_value(&value))),
            )
            .collect();

        Ok(Self { action, fields })
    }

    #[must_use]
    pub const fn method(&self) -> &'static str {
        Self::METHOD
    }

    #[must_use]
    pub const fn action(&self) -> &Url {
        &self.action
    }

    /// Hidden inputs in submission order.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    #[must_use]
    pub fn has_csrf_token(&self) -> bool {
        self.fields
            .iter()
            .any(|(name, value)| name == CSRF_FIELD && !value.is_empty())
    }

    /// Render the auto-submitting page. `nonce` authorizes its inline script.
    ///
    /// # Errors
    ///
    /// Returns an error if the page fails to render.
    pub fn execute(&self, nonce: &str) -> Result<Html<String>, HandoffError> {
        tracing::info!(
            target: "security",
            event = "payment_handoff_start",
            action = %self.action,
            field_count = self.fields.len(),
            has_csrf_token = self.has_csrf_token(),
            "Submitting payment form"
        );

        let page = HandoffTemplate {
            handoff: self,
            nonce,
        };

        match page.render() {
            Ok(body) => {
                tracing::info!(
                    target: "security",
                    event = "payment_handoff_submitted",
                    action = %self.action,
                    field_count = self.fields.len(),
                    has_csrf_token = self.has_csrf_token(),
                    "Payment form handed to browser"
                );
                Ok(Html(body))
            }
            Err(e) => {
                tracing::error!(
                    target: "security",
                    event = "payment_handoff_error",
                    action = %self.action,
                    field_count = self.fields.len(),
                    has_csrf_token = self.has_csrf_token(),
                    error = %e,
                    "Payment form failed to render"
                );
                Err(HandoffError::Render(e))
            }
        }
    }
}

fn parse_action(form_action: &str) -> Result<Url, HandoffError> {
    let action = Url::parse(form_action.trim())?;
    match action.scheme() {
        "http" | "https" => Ok(action),
        other => Err(HandoffError::UnsupportedScheme(other.to_owned())),
    }
}

/// Auto-submitting payment form page.
#[derive(Template)]
#[template(path = "checkout/handoff.html")]
struct HandoffTemplate<'a> {
    handoff: &'a PaymentHandoff,
    nonce: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const ACTION: &str = "https://rc-epay.esewa.com.np/api/epay/main/v2/form";

    fn fields() -> Vec<(String, String)> {
        vec![
            ("total_amount".to_string(), "1700".to_string()),
            ("transaction_uuid".to_string(), " t-1 ".to_string()),
        ]
    }

    #[test]
    fn test_generate_csrf_token() {
        let token = generate_csrf_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_csrf_token());
    }

    #[test]
    fn test_sanitize_value_strips_angle_brackets() {
        assert_eq!(sanitize_value("<script>alert(1)</script>"), "scriptalert(1)/script");
        assert_eq!(sanitize_value("  1700 "), "1700");
        assert_eq!(sanitize_value("< ok >"), "ok");
    }

    #[test]
    fn test_build_puts_token_first() {
        let handoff = PaymentHandoff::build(ACTION, fields(), Some("abc".to_string())).unwrap();
        assert_eq!(handoff.method(), "POST");
        assert_eq!(handoff.action().as_str(), ACTION);
        assert_eq!(handoff.fields()[0], (CSRF_FIELD.to_string(), "abc".to_string()));
        assert_eq!(handoff.fields()[2], ("transaction_uuid".to_string(), "t-1".to_string()));
        assert!(handoff.has_csrf_token());
    }

    #[test]
    fn test_build_generates_token_when_missing() {
        let handoff = PaymentHandoff::build(ACTION, fields(), None).unwrap();
        assert_eq!(handoff.fields()[0].0, CSRF_FIELD);
        assert_eq!(handoff.fields()[0].1.len(), 64);
    }

    #[test]
    fn test_build_sanitizes_every_value() {
        let handoff = PaymentHandoff::build(
            ACTION,
            vec![("success_url".to_string(), "<script>x</script>".to_string())],
            None,
        )
        .unwrap();
        assert!(handoff.fields().iter().all(|(_, v)| !v.contains(['<', '>'])));
    }

    #[test]
    fn test_build_rejects_bad_actions() {
        assert!(matches!(
            PaymentHandoff::build("not a url", fields(), None),
            Err(HandoffError::InvalidAction(_))
        ));
        assert!(matches!(
            PaymentHandoff::build("javascript:alert(1)", fields(), None),
            Err(HandoffError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_execute_renders_hidden_form() {
        let handoff = PaymentHandoff::build(
            ACTION,
            vec![("product_code".to_string(), "EPAYTEST\"x".to_string())],
            Some("tok".to_string()),
        )
        .unwrap();
        let Html(body) = handoff.execute("n0nce").unwrap();

        assert!(body.contains(r#"method="POST""#));
        assert!(body.contains("rc-epay.esewa.com.np"));
        assert!(body.contains(r#"name="csrf_token""#));
        assert!(body.contains(r#"value="tok""#));
        assert!(body.contains(r#"nonce="n0nce""#));
        assert!(!body.contains("EPAYTEST\"x"));
    }
}
