//! Read-only cart snapshot.
//!
//! The cart is owned by the backend; checkout only reads it.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// Product details carried on a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    #[serde(alias = "_id")]
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub original_price: Price,
    #[serde(default)]
    pub discount_price: Option<Price>,
}

impl CartProduct {
    /// Price actually charged: the discount price when present and non-zero,
    /// otherwise the original price.
    #[must_use]
    pub fn effective_price(&self) -> Price {
        match self.discount_price {
            Some(price) if price != Price::ZERO => price,
            _ => self.original_price,
        }
    }
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: CartProduct,
    pub quantity: u32,
}

impl CartLine {
    /// Effective price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.effective_price().times(self.quantity)
    }
}

/// Ordered cart contents at the moment checkout read them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

impl CartSnapshot {
    /// True when there is nothing to check out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |count, line| count.saturating_add(line.quantity))
    }

    /// Sum of line totals, or `None` if any line or the sum overflows.
    ///
    /// Prices and quantities come from the backend; a cart that fails this
    /// check cannot be priced.
    #[must_use]
    pub fn checked_subtotal(&self) -> Option<Price> {
        self.items.iter().try_fold(Price::ZERO, |subtotal, line| {
            let line_total = line.product.effective_price().checked_times(line.quantity)?;
            subtotal.checked_add(line_total)
        })
    }
}
