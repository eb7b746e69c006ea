//! Checkout form state: both addresses, the shipping choice and the current
//! field errors.

use serde::Deserialize;

use himal_core::{AddressField, BillingAddress, FormAddress, Price, ShippingRegion};

use super::shipping::ShippingSelection;
use super::validation::{ValidationErrors, validate_form};

/// The checkout form as the customer is filling it in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutForm {
    shipping: FormAddress,
    billing: BillingAddress,
    selection: ShippingSelection,
    errors: ValidationErrors,
}

impl CheckoutForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the form from a posted submission.
    ///
    /// Province and city are resolved against `regions`; a value that is not
    /// offered there is dropped.
    #[must_use]
    pub fn from_submission(submission: &CheckoutSubmission, regions: &[ShippingRegion]) -> Self {
        let mut form = Self::new();
        form.set_same_as_shipping(submission.same_as_shipping.is_some());

        for field in AddressField::ALL {
            if matches!(
                field,
                AddressField::Province | AddressField::City | AddressField::Country
            ) {
                continue;
            }
            form.set_shipping_field(field, submission.shipping_value(field));
        }
        form.select_region(regions, &submission.province);
        form.select_city(regions, &submission.city);

        if !form.billing.same_as_shipping {
            for field in AddressField::ALL {
                if field == AddressField::Country {
                    continue;
                }
                form.set_billing_field(field, submission.billing_value(field));
            }
        }

        form
    }

    #[must_use]
    pub const fn shipping(&self) -> &FormAddress {
        &self.shipping
    }

    #[must_use]
    pub const fn billing(&self) -> &BillingAddress {
        &self.billing
    }

    #[must_use]
    pub const fn selection(&self) -> &ShippingSelection {
        &self.selection
    }

    #[must_use]
    pub const fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Current shipping charge; zero until a city is chosen.
    #[must_use]
    pub const fn shipping_charge(&self) -> Price {
        self.selection.charge()
    }

    /// Submission stays disabled until a city (and so a charge) is known.
    #[must_use]
    pub const fn can_submit(&self) -> bool {
        self.selection.is_complete()
    }

    /// Edit a shipping field.
    ///
    /// Clears that field's error and, while billing mirrors shipping, copies
    /// the value into billing. Country is never mirrored.
    pub fn set_shipping_field(&mut self, field: AddressField, value: impl Into<String>) {
        let value = value.into();
        if self.billing.same_as_shipping && field != AddressField::Country {
            self.billing.address.set(field, value.clone());
        }
        self.shipping.set(field, value);
        self.errors.remove(field.key());
    }

    /// Edit a billing field, clearing its `billing_` error.
    pub fn set_billing_field(&mut self, field: AddressField, value: impl Into<String>) {
        self.billing.address.set(field, value);
        self.errors.remove(&field.billing_key());
    }

    /// Toggle billing mirroring. Turning it on copies the shipping address
    /// over billing and drops every billing error.
    pub fn set_same_as_shipping(&mut self, same: bool) {
        self.billing.same_as_shipping = same;
        if same {
            self.billing.address = self.shipping.clone();
            self.errors.clear_billing();
        }
    }

    /// Change province: clears the city and zeroes the charge.
    pub fn select_region(&mut self, regions: &[ShippingRegion], name: &str) {
        let province = if self.selection.choose_region(regions, name) {
            name
        } else {
            ""
        };
        self.set_shipping_field(AddressField::Province, province);
        self.set_shipping_field(AddressField::City, "");
    }

    /// Change city within the current province and pick up its charge.
    pub fn select_city(&mut self, regions: &[ShippingRegion], name: &str) {
        let city = if self.selection.choose_city(regions, name) {
            name
        } else {
            ""
        };
        self.set_shipping_field(AddressField::City, city);
    }

    /// Re-run every check, replacing the stored errors. Returns true when the
    /// form is valid.
    pub fn validate(&mut self) -> bool {
        let billing = (!self.billing.same_as_shipping).then_some(&self.billing.address);
        self.errors = validate_form(&self.shipping, billing);
        self.errors.is_empty()
    }

    /// Shipping address as it is sent with the order: trimmed, email
    /// lower-cased.
    #[must_use]
    pub fn normalized_shipping(&self) -> FormAddress {
        let mut address = self.shipping.trimmed();
        address.email = address.email.to_lowercase();
        address
    }
}

/// Checkout form as posted by the browser.
///
/// Field names match [`AddressField::key`]; billing fields carry the
/// `billing_` prefix. The `same_as_shipping` checkbox is present only when
/// ticked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutSubmission {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub province: String,
    pub city: String,
    pub postal_code: String,
    pub same_as_shipping: Option<String>,
    pub billing_first_name: String,
    pub billing_last_name: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub billing_address: String,
    pub billing_province: String,
    pub billing_city: String,
    pub billing_postal_code: String,
}

impl CheckoutSubmission {
    fn shipping_value(&self, field: AddressField) -> &str {
        match field {
            AddressField::FirstName => &self.first_name,
            AddressField::LastName => &self.last_name,
            AddressField::Email => &self.email,
            AddressField::Phone => &self.phone,
            AddressField::Address => &self.address,
            AddressField::Province => &self.province,
            AddressField::City => &self.city,
            AddressField::PostalCode => &self.postal_code,
            AddressField::Country => himal_core::DEFAULT_COUNTRY,
        }
    }

    fn billing_value(&self, field: AddressField) -> &str {
        match field {
            AddressField::FirstName => &self.billing_first_name,
            AddressField::LastName => &self.billing_last_name,
            AddressField::Email => &self.billing_email,
            AddressField::Phone => &self.billing_phone,
            AddressField::Address => &self.billing_address,
            AddressField::Province => &self.billing_province,
            AddressField::City => &self.billing_city,
            AddressField::PostalCode => &self.billing_postal_code,
            AddressField::Country => himal_core::DEFAULT_COUNTRY,
        }
    }
}
