//! Checkout form validation.
//!
//! Predicates accept or reject exactly what the storefront has always
//! accepted, including two quirks customers rely on: names are Latin letters
//! and spaces only, and phone length counts separators as well as digits.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use himal_core::{AddressField, Email, FormAddress, trim_form, utf16_len};

// `\s` here follows `himal_core::is_form_whitespace`: U+FEFF in, U+0085 out.
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[[a-zA-Z\s\x{FEFF}]&&[^\x{85}]]+$").expect("Invalid regex")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+]?[[0-9\s\x{FEFF}\-()]&&[^\x{85}]]{10,15}$").expect("Invalid regex")
});

pub const FIRST_NAME_MESSAGE: &str =
    "First name must be at least 2 characters and contain only letters";
pub const LAST_NAME_MESSAGE: &str =
    "Last name must be at least 2 characters and contain only letters";
pub const EMAIL_MESSAGE: &str = "Please enter a valid email address";
pub const PHONE_MESSAGE: &str = "Please enter a valid phone number";
pub const ADDRESS_MESSAGE: &str = "Address must be at least 3 characters";
pub const PROVINCE_MESSAGE: &str = "Please select a province";
pub const CITY_MESSAGE: &str = "Please select a city";

/// At least two UTF-16 units after trimming, letters and whitespace only.
#[must_use]
pub fn validate_name(value: &str) -> bool {
    utf16_len(trim_form(value)) >= 2 && NAME_RE.is_match(value)
}

/// Loose `local@domain.tld` shape check.
#[must_use]
pub fn validate_email(value: &str) -> bool {
    Email::parse(value).is_ok()
}

/// Optional leading `+`, then 10 to 15 digits, spaces, dashes or parentheses.
#[must_use]
pub fn validate_phone(value: &str) -> bool {
    PHONE_RE.is_match(value)
}

/// At least three UTF-16 units after trimming.
#[must_use]
pub fn validate_address(value: &str) -> bool {
    utf16_len(trim_form(value)) >= 3
}

/// Field-level validation messages.
///
/// Shipping errors are keyed by the plain field name (`first_name`), billing
/// errors by the `billing_` prefixed name. A missing key means the field is
/// valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, &'static str>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Message for `key`, if that field is invalid.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        self.errors.get(key).copied()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.errors.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, message: &'static str) {
        self.errors.insert(key.into(), message);
    }

    pub fn remove(&mut self, key: &str) {
        self.errors.remove(key);
    }

    /// Drop every `billing_` error.
    pub fn clear_billing(&mut self) {
        self.errors.retain(|key, _| !key.starts_with(BILLING_PREFIX));
    }

    /// Iterate `(key, message)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.errors.iter().map(|(key, message)| (key.as_str(), *message))
    }
}

const BILLING_PREFIX: &str = "billing_";

/// Which copy of the address is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Shipping,
    Billing,
}

impl Side {
    fn key(self, field: AddressField) -> String {
        match self {
            Self::Shipping => field.key().to_owned(),
            Self::Billing => field.billing_key(),
        }
    }
}

/// Validate the shipping address and, when it is entered separately, the
/// billing address.
///
/// Billing checks city presence but not province presence.
#[must_use]
pub fn validate_form(
    shipping: &FormAddress,
    billing: Option<&FormAddress>,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    check_contact(&mut errors, shipping, Side::Shipping);
    if shipping.province.is_empty() {
        errors.insert(AddressField::Province.key(), PROVINCE_MESSAGE);
    }
    if shipping.city.is_empty() {
        errors.insert(AddressField::City.key(), CITY_MESSAGE);
    }

    if let Some(billing) = billing {
        check_contact(&mut errors, billing, Side::Billing);
        if billing.city.is_empty() {
            errors.insert(AddressField::City.billing_key(), CITY_MESSAGE);
        }
    }

    errors
}

fn check_contact(errors: &mut ValidationErrors, address: &FormAddress, side: Side) {
    let checks: [(AddressField, fn(&str) -> bool, &'static str); 5] = [
        (AddressField::FirstName, validate_name, FIRST_NAME_MESSAGE),
        (AddressField::LastName, validate_name, LAST_NAME_MESSAGE),
        (AddressField::Email, validate_email, EMAIL_MESSAGE),
        (AddressField::Phone, validate_phone, PHONE_MESSAGE),
        (AddressField::Address, validate_address, ADDRESS_MESSAGE),
    ];

    for (field, is_valid, message) in checks {
        if !is_valid(address.get(field)) {
            errors.insert(side.key(field), message);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid_address() -> FormAddress {
        FormAddress {
            first_name: "Sita".to_string(),
            last_name: "Sharma".to_string(),
            email: "sita@example.com".to_string(),
            phone: "9841234567".to_string(),
            address: "Thamel Marg".to_string(),
            province: "Bagmati".to_string(),
            city: "Kathmandu".to_string(),
            ..FormAddress::default()
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Sita"));
        assert!(validate_name("Ram Bahadur"));
        assert!(!validate_name("S"));
        assert!(!validate_name("  S  "));
        assert!(!validate_name("O'Brien"));
        assert!(!validate_name("Jean-Luc"));
        assert!(!validate_name("सीता"));
        assert!(!validate_name(""));
    }

    #[test]
    fn test_whitespace_and_length_follow_form_rules() {
        assert!(validate_name("\u{feff}Sita"));
        assert!(!validate_name("\u{85}Sita"));
        assert!(!validate_address("\u{feff}ab"));
        assert!(validate_address("😀a"));
        assert!(validate_phone("\u{feff}9841234567"));
    }

    #[test]
    fn test_validate_phone_counts_separators() {
        assert!(validate_phone("9841234567"));
        assert!(validate_phone("+977 9841234567"));
        assert!(validate_phone("(01) 4412-345"));
        // Ten characters but only eight digits.
        assert!(validate_phone("98-41-2345"));
        assert!(!validate_phone("984123456"));
        assert!(!validate_phone("9841234567890123"));
        assert!(!validate_phone("98412x4567"));
        assert!(!validate_phone("++9841234567"));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("sita@example.com"));
        assert!(!validate_email("sita@example"));
        assert!(!validate_email("sita example.com"));
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("Baneshwor"));
        assert!(validate_address(" abc "));
        assert!(!validate_address(" ab "));
    }

    #[test]
    fn test_valid_form_has_no_errors() {
        assert!(validate_form(&valid_address(), None).is_empty());
    }

    #[test]
    fn test_shipping_errors_use_plain_keys() {
        let mut address = valid_address();
        address.first_name = "S".to_string();
        address.phone = "123".to_string();
        address.province.clear();
        address.city.clear();

        let errors = validate_form(&address, None);
        assert_eq!(errors.get("first_name"), Some(FIRST_NAME_MESSAGE));
        assert_eq!(errors.get("phone"), Some(PHONE_MESSAGE));
        assert_eq!(errors.get("province"), Some(PROVINCE_MESSAGE));
        assert_eq!(errors.get("city"), Some(CITY_MESSAGE));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_billing_checks_city_but_not_province() {
        let mut billing = valid_address();
        billing.province.clear();
        billing.city.clear();
        billing.email = "nope".to_string();

        let errors = validate_form(&valid_address(), Some(&billing));
        assert_eq!(errors.get("billing_city"), Some(CITY_MESSAGE));
        assert_eq!(errors.get("billing_email"), Some(EMAIL_MESSAGE));
        assert!(!errors.contains("billing_province"));
        assert!(!errors.contains("province"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut address = valid_address();
        address.last_name = "X1".to_string();
        let first = validate_form(&address, Some(&FormAddress::default()));
        let second = validate_form(&address, Some(&FormAddress::default()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_clear_billing() {
        let mut errors = ValidationErrors::new();
        errors.insert("email", EMAIL_MESSAGE);
        errors.insert("billing_email", EMAIL_MESSAGE);
        errors.insert("billing_city", CITY_MESSAGE);
        errors.clear_billing();
        assert_eq!(errors.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["email"]);
    }
}
