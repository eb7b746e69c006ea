//! Checkout address types.
//!
//! Shipping and billing share one shape. Billing carries an extra
//! `same_as_shipping` flag; mirroring itself lives with the checkout form.

use serde::{Deserialize, Serialize};

use super::text::trim_form;

/// Default country for every address; the store only ships within Nepal.
pub const DEFAULT_COUNTRY: &str = "Nepal";

/// One editable field of a [`FormAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressField {
    FirstName,
    LastName,
    Email,
    Phone,
    Address,
    Province,
    City,
    PostalCode,
    Country,
}

impl AddressField {
    /// Every field, in form order.
    pub const ALL: [Self; 9] = [
        Self::FirstName,
        Self::LastName,
        Self::Email,
        Self::Phone,
        Self::Address,
        Self::Province,
        Self::City,
        Self::PostalCode,
        Self::Country,
    ];

    /// Form field name, also the shipping key in validation error maps.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Province => "province",
            Self::City => "city",
            Self::PostalCode => "postal_code",
            Self::Country => "country",
        }
    }

    /// Key used for the billing copy of this field.
    #[must_use]
    pub fn billing_key(self) -> String {
        format!("billing_{}", self.key())
    }
}

/// An address as entered on the checkout form.
///
/// Values are raw user input; trimming and normalization happen when the
/// order draft is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormAddress {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub province: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl Default for FormAddress {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            province: String::new(),
            city: String::new(),
            postal_code: String::new(),
            country: DEFAULT_COUNTRY.to_owned(),
        }
    }
}

impl FormAddress {
    /// Read a field.
    #[must_use]
    pub fn get(&self, field: AddressField) -> &str {
        match field {
            AddressField::FirstName => &self.first_name,
            AddressField::LastName => &self.last_name,
            AddressField::Email => &self.email,
            AddressField::Phone => &self.phone,
            AddressField::Address => &self.address,
            AddressField::Province => &self.province,
            AddressField::City => &self.city,
            AddressField::PostalCode => &self.postal_code,
            AddressField::Country => &self.country,
        }
    }

    /// Overwrite a field.
    pub fn set(&mut self, field: AddressField, value: impl Into<String>) {
        let slot = match field {
            AddressField::FirstName => &mut self.first_name,
            AddressField::LastName => &mut self.last_name,
            AddressField::Email => &mut self.email,
            AddressField::Phone => &mut self.phone,
            AddressField::Address => &mut self.address,
            AddressField::Province => &mut self.province,
            AddressField::City => &mut self.city,
            AddressField::PostalCode => &mut self.postal_code,
            AddressField::Country => &mut self.country,
        };
        *slot = value.into();
    }

    /// Copy of this address with every value trimmed.
    #[must_use]
    pub fn trimmed(&self) -> Self {
        let mut out = self.clone();
        for field in AddressField::ALL {
            let value = trim_form(self.get(field)).to_owned();
            out.set(field, value);
        }
        out
    }
}

/// Billing address with the "same as shipping" toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAddress {
    #[serde(flatten)]
    pub address: FormAddress,
    pub same_as_shipping: bool,
}

impl Default for BillingAddress {
    fn default() -> Self {
        Self {
            address: FormAddress::default(),
            same_as_shipping: true,
        }
    }
}
