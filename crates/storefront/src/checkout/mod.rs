//! Checkout flow.
//!
//! - [`shipping`] resolves province, city and the flat shipping charge
//! - [`validation`] checks the address fields
//! - [`form`] holds both addresses and keeps billing in step with shipping
//! - [`limiter`] caps payment attempts per customer
//! - [`totals`] computes the order summary
//! - [`flow`] runs the submission state machine
//! - [`handoff`] builds the POST form that sends the customer to payment

pub mod flow;
pub mod form;
pub mod handoff;
pub mod limiter;
pub mod shipping;
pub mod totals;
pub mod validation;

pub use flow::{
    CheckoutFailure, CheckoutService, CheckoutState, InFlightGuard, OrderGateway, PendingOrder,
    Submission, SubmittedOrder,
};
pub use form::{CheckoutForm, CheckoutSubmission};
pub use handoff::{HandoffError, PaymentHandoff, generate_csrf_token, sanitize_value};
pub use limiter::{AttemptDecision, AttemptLimiter, AttemptStore, Clock, MemoryAttemptStore, SystemClock};
pub use shipping::ShippingSelection;
pub use totals::OrderTotals;
pub use validation::ValidationErrors;
