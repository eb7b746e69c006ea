//! Text rules shared by form validation.
//!
//! Form input is judged the way the customer's browser judges it: whitespace
//! is the Unicode space separators, the ASCII controls `\t\n\v\f\r`, line and
//! paragraph separators, and U+FEFF. U+0085 is not whitespace here.

/// True if `c` counts as whitespace in form input.
#[must_use]
pub fn is_form_whitespace(c: char) -> bool {
    c == '\u{feff}' || (c.is_whitespace() && c != '\u{85}')
}

/// `value` without leading or trailing form whitespace.
#[must_use]
pub fn trim_form(value: &str) -> &str {
    value.trim_matches(is_form_whitespace)
}

/// Length in UTF-16 code units, as a browser reports it.
#[must_use]
pub fn utf16_len(value: &str) -> usize {
    value.encode_utf16().count()
}
