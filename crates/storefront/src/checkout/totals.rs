//! Order totals.
//!
//! Catalogue prices already include VAT, so the tax line is informational:
//! it is extracted from the subtotal for display and never added to the
//! total.

use himal_core::{CartSnapshot, Price, TaxRate};

/// Money lines shown in the order summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderTotals {
    pub subtotal: Price,
    /// VAT contained in `subtotal`, rounded to whole rupees.
    pub tax: Price,
    pub shipping: Price,
    pub total: Price,
}

impl OrderTotals {
    /// Compute totals for `cart` with a flat `shipping` charge.
    #[must_use]
    pub fn compute(cart: &CartSnapshot, shipping: Price) -> Self {
        let subtotal: Price = cart.items.iter().map(|line| line.line_total()).sum();
        let tax: Price = cart
            .items
            .iter()
            .map(|line| line.line_total().included_tax(TaxRate::NEPAL_VAT))
            .sum();

        Self {
            subtotal,
            tax: tax.round_whole(),
            shipping,
            total: subtotal + shipping,
        }
    }
}
