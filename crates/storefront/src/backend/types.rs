//! Wire types for the commerce backend REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use himal_core::{FormAddress, OrderId, ProductId};

/// Standard response envelope used by list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    /// The most specific message the backend gave.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .filter(|message| !message.trim().is_empty())
    }
}

/// One line of an order draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Payload sent to order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub items: Vec<OrderItem>,
    pub shipping_info: FormAddress,
}

/// Result of a successful order creation.
///
/// `fields` is opaque: it is forwarded to the payment processor untouched
/// apart from sanitization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: OrderId,
    pub form_action: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl CreatedOrder {
    /// Field value rendered as text (`"1700"` for the number `1700`).
    #[must_use]
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(field_value_text)
    }

    /// Every field rendered as text, in key order.
    #[must_use]
    pub fn text_fields(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.clone(), field_value_text(value)))
            .collect()
    }
}

/// Render a JSON scalar the way a form input would carry it.
fn field_value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
