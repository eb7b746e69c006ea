//! Core types for Himal Bazaar.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod shipping;
pub mod text;

pub use address::{AddressField, BillingAddress, DEFAULT_COUNTRY, FormAddress};
pub use cart::{CartLine, CartProduct, CartSnapshot};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price, TaxRate};
pub use shipping::{ShippingCity, ShippingRegion};
pub use text::{is_form_whitespace, trim_form, utf16_len};
