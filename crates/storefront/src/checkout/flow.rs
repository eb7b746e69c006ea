//! Order submission.
//!
//! ```text
//! Idle -> Validating -> RateLimitCheck -> Submitting -> Redirecting
//!   \________\_______________\________________\______-> Failed(reason)
//! ```
//!
//! `Redirecting` is terminal: the browser leaves for the payment processor.
//! `Failed` puts the customer back on the form with a message; nothing about
//! a failed run blocks the next one.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use himal_core::{CartSnapshot, FormAddress, OrderId, Price, UserId};

use crate::backend::{BackendClient, BackendError, CreatedOrder, OrderDraft, OrderItem};
use crate::error::add_breadcrumb;
use crate::models::CurrentCustomer;

use super::form::CheckoutForm;
use super::handoff::PaymentHandoff;
use super::limiter::AttemptLimiter;
use super::totals::OrderTotals;

/// Creates orders on behalf of a signed-in customer.
pub trait OrderGateway: Send + Sync {
    fn create_order(
        &self,
        access_token: &str,
        draft: &OrderDraft,
    ) -> impl Future<Output = Result<CreatedOrder, BackendError>> + Send;
}

impl OrderGateway for BackendClient {
    async fn create_order(
        &self,
        access_token: &str,
        draft: &OrderDraft,
    ) -> Result<CreatedOrder, BackendError> {
        Self::create_order(self, access_token, draft).await
    }
}

/// Why a submission went back to the form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutFailure {
    #[error("Please correct the highlighted fields")]
    Invalid,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Your order is already being processed")]
    AlreadyProcessing,

    #[error("Too many payment attempts. Please try again after {}.", format_reset_time(.reset_time))]
    RateLimited { reset_time: DateTime<Utc> },

    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    #[error("{0}")]
    OrderRejected(String),

    #[error("Unable to start payment. Please try again.")]
    Handoff,
}

/// Nepal Standard Time, UTC+05:45.
const NPT_OFFSET_SECS: i32 = 5 * 3600 + 45 * 60;

fn format_reset_time(reset_time: &DateTime<Utc>) -> String {
    FixedOffset::east_opt(NPT_OFFSET_SECS).map_or_else(
        || reset_time.format("%-I:%M %p UTC").to_string(),
        |offset| reset_time.with_timezone(&offset).format("%-I:%M %p").to_string(),
    )
}

/// What the success page needs after the customer returns from payment.
///
/// Stored in the session under [`crate::models::session::keys::PENDING_ORDER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    pub order_id: OrderId,
    pub transaction_uuid: String,
    pub total_amount: Price,
    pub shipping_info: FormAddress,
}

/// A created order on its way to the payment processor.
#[derive(Debug, Clone)]
pub struct SubmittedOrder {
    pub pending: PendingOrder,
    pub handoff: PaymentHandoff,
    pub totals: OrderTotals,
}

/// Submission state.
#[derive(Debug, Clone)]
pub enum CheckoutState {
    Idle,
    Validating,
    RateLimitCheck,
    Submitting,
    Redirecting(Box<SubmittedOrder>),
    Failed(CheckoutFailure),
}

impl CheckoutState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::RateLimitCheck => "rate_limit_check",
            Self::Submitting => "submitting",
            Self::Redirecting(_) => "redirecting",
            Self::Failed(_) => "failed",
        }
    }

    /// True while the submit control must stay disabled.
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        matches!(self, Self::Submitting | Self::Redirecting(_))
    }
}

/// One pass through the submission state machine.
#[derive(Debug)]
pub struct Submission {
    state: CheckoutState,
    history: Vec<&'static str>,
}

impl Submission {
    fn new() -> Self {
        Self {
            state: CheckoutState::Idle,
            history: vec![CheckoutState::Idle.name()],
        }
    }

    fn advance(&mut self, next: CheckoutState) {
        tracing::debug!(from = self.state.name(), to = next.name(), "Checkout transition");
        add_breadcrumb("checkout", next.name(), None);
        self.history.push(next.name());
        self.state = next;
    }

    fn fail(mut self, failure: CheckoutFailure) -> Self {
        self.advance(CheckoutState::Failed(failure));
        self
    }

    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> CheckoutState {
        self.state
    }

    /// Names of every state visited, starting with `idle`.
    #[must_use]
    pub fn history(&self) -> &[&'static str] {
        &self.history
    }
}

/// Users with a submission currently in flight.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    users: Arc<DashSet<UserId>>,
}

impl InFlightGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the user's submission slot. `None` if one is already running.
    /// The slot is released when the ticket drops, including when the request
    /// is abandoned mid-flight.
    #[must_use]
    pub fn acquire(&self, user: &UserId) -> Option<InFlightTicket> {
        self.users.insert(user.clone()).then(|| InFlightTicket {
            users: Arc::clone(&self.users),
            user: user.clone(),
        })
    }

    #[must_use]
    pub fn is_processing(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }
}

/// Held for the duration of one submission.
#[derive(Debug)]
pub struct InFlightTicket {
    users: Arc<DashSet<UserId>>,
    user: UserId,
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.users.remove(&self.user);
    }
}

/// Drives order submission for signed-in customers.
pub struct CheckoutService<G = BackendClient> {
    gateway: G,
    limiter: AttemptLimiter,
    in_flight: InFlightGuard,
    reset_limit_on_success: bool,
}

impl<G: OrderGateway> CheckoutService<G> {
    #[must_use]
    pub fn new(gateway: G, limiter: AttemptLimiter, reset_limit_on_success: bool) -> Self {
        Self {
            gateway,
            limiter,
            in_flight: InFlightGuard::new(),
            reset_limit_on_success,
        }
    }

    #[must_use]
    pub const fn limiter(&self) -> &AttemptLimiter {
        &self.limiter
    }

    #[must_use]
    pub const fn in_flight(&self) -> &InFlightGuard {
        &self.in_flight
    }

    /// Run one submission. The returned state is either `Redirecting` or
    /// `Failed`; field errors are left on `form`.
    #[instrument(skip_all, fields(user_id = %customer.id, items = cart.items.len()))]
    pub async fn submit(
        &self,
        customer: &CurrentCustomer,
        cart: &CartSnapshot,
        form: &mut CheckoutForm,
    ) -> Submission {
        let run = Submission::new();

        let Some(_ticket) = self.in_flight.acquire(&customer.id) else {
            warn!("Rejected concurrent checkout submission");
            return run.fail(CheckoutFailure::AlreadyProcessing);
        };

        self.drive(run, customer, cart, form).await
    }

    async fn drive(
        &self,
        mut run: Submission,
        customer: &CurrentCustomer,
        cart: &CartSnapshot,
        form: &mut CheckoutForm,
    ) -> Submission {
        run.advance(CheckoutState::Validating);
        if !form.validate() {
            return run.fail(CheckoutFailure::Invalid);
        }
        if cart.is_empty() {
            return run.fail(CheckoutFailure::EmptyCart);
        }

        run.advance(CheckoutState::RateLimitCheck);
        let decision = self.limiter.can_attempt(&customer.id);
        if !decision.allowed {
            warn!(target: "security", user_id = %customer.id, "Payment attempt limit reached");
            let reset_time = decision.reset_time.unwrap_or_else(Utc::now);
            return run.fail(CheckoutFailure::RateLimited { reset_time });
        }

        run.advance(CheckoutState::Submitting);
        let totals = OrderTotals::compute(cart, form.shipping_charge());
        let draft = OrderDraft {
            items: cart
                .items
                .iter()
                .map(|line| OrderItem {
                    product_id: line.product.id.clone(),
                    quantity: line.quantity,
                })
                .collect(),
            shipping_info: form.normalized_shipping(),
        };

        let order = match self
            .gateway
            .create_order(customer.access_token.expose(), &draft)
            .await
        {
            Ok(order) => order,
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "Backend rejected customer token");
                return run.fail(CheckoutFailure::SessionExpired);
            }
            Err(e) => {
                warn!(error = %e, "Order creation failed");
                return run.fail(CheckoutFailure::OrderRejected(e.user_message()));
            }
        };

        let handoff = match PaymentHandoff::build(&order.form_action, order.text_fields(), None) {
            Ok(handoff) => handoff,
            Err(e) => {
                warn!(error = %e, order_id = %order.order_id, "Payment handoff rejected");
                return run.fail(CheckoutFailure::Handoff);
            }
        };

        if self.reset_limit_on_success {
            self.limiter.reset_attempts(&customer.id);
        }

        info!(order_id = %order.order_id, total = %totals.total, "Order created, redirecting to payment");

        let pending = PendingOrder {
            transaction_uuid: order.field_text("transaction_uuid").unwrap_or_default(),
            order_id: order.order_id,
            total_amount: totals.total,
            shipping_info: draft.shipping_info,
        };

        run.advance(CheckoutState::Redirecting(Box::new(SubmittedOrder {
            pending,
            handoff,
            totals,
        })));
        run
    }
}
