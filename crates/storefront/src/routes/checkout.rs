//! Checkout route handlers.
//!
//! The page is rendered on the server. Province and city changes come back
//! as HTMX fragments; submitting posts the whole form and answers with
//! either the payment handoff page or the form again with its errors.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::instrument;

use himal_core::{AddressField, CartLine, CartSnapshot, FormAddress, ShippingRegion};

use crate::checkout::shipping::select_region;
use crate::checkout::{
    CheckoutFailure, CheckoutForm, CheckoutState, CheckoutSubmission, OrderTotals, PendingOrder,
    ValidationErrors,
};
use crate::error::{AppError, Result, set_sentry_user};
use crate::middleware::{CspNonce, RequireAuth, login_url};
use crate::models::{CurrentCustomer, session_keys};
use crate::state::AppState;

/// Checkout page path.
pub const CHECKOUT_PATH: &str = "/checkout";

/// Where customers with an empty cart are sent.
pub const CART_PATH: &str = "/cart";

const SHIPPING_UNAVAILABLE_MESSAGE: &str =
    "Unable to load shipping options. Please refresh the page.";

const SELECT_CITY_LABEL: &str = "Select a city";

/// Shipping address inputs rendered as text boxes; province and city are
/// selects and country is fixed.
const SHIPPING_INPUTS: [AddressField; 6] = [
    AddressField::FirstName,
    AddressField::LastName,
    AddressField::Email,
    AddressField::Phone,
    AddressField::Address,
    AddressField::PostalCode,
];

const BILLING_INPUTS: [AddressField; 8] = [
    AddressField::FirstName,
    AddressField::LastName,
    AddressField::Email,
    AddressField::Phone,
    AddressField::Address,
    AddressField::Province,
    AddressField::City,
    AddressField::PostalCode,
];

// =============================================================================
// View types
// =============================================================================

/// Cart line display data for templates.
#[derive(Clone)]
pub struct LineView {
    pub title: String,
    /// First product image, empty when there is none.
    pub image: String,
    pub quantity: u32,
    pub unit_price: String,
    /// Struck-through list price, empty unless discounted.
    pub original_price: String,
    pub line_total: String,
}

impl From<&CartLine> for LineView {
    fn from(line: &CartLine) -> Self {
        let product = &line.product;
        let unit = product.effective_price();

        Self {
            title: product.title.clone(),
            image: product.images.first().cloned().unwrap_or_default(),
            quantity: line.quantity,
            unit_price: unit.display(),
            original_price: if unit == product.original_price {
                String::new()
            } else {
                product.original_price.display()
            },
            line_total: line.line_total().display(),
        }
    }
}

/// Order summary display data.
#[derive(Clone)]
pub struct SummaryView {
    pub item_count: u32,
    pub subtotal: String,
    pub tax: String,
    pub shipping: String,
    pub total: String,
    pub can_submit: bool,
}

impl SummaryView {
    fn new(cart: &CartSnapshot, form: &CheckoutForm) -> Self {
        let totals = OrderTotals::compute(cart, form.shipping_charge());

        Self {
            item_count: cart.item_count(),
            subtotal: totals.subtotal.display(),
            tax: totals.tax.display(),
            shipping: if form.can_submit() {
                totals.shipping.display()
            } else {
                SELECT_CITY_LABEL.to_string()
            },
            total: totals.total.display(),
            can_submit: form.can_submit(),
        }
    }
}

/// One address input.
#[derive(Clone)]
pub struct FieldView {
    pub name: String,
    pub label: &'static str,
    pub value: String,
    pub input_type: &'static str,
    pub autocomplete: &'static str,
    /// Validation message, empty when the field is fine.
    pub error: &'static str,
}

/// One `<option>` of the province or city select.
#[derive(Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

const fn field_meta(field: AddressField) -> (&'static str, &'static str, &'static str) {
    match field {
        AddressField::FirstName => ("First name", "text", "given-name"),
        AddressField::LastName => ("Last name", "text", "family-name"),
        AddressField::Email => ("Email", "email", "email"),
        AddressField::Phone => ("Phone", "tel", "tel"),
        AddressField::Address => ("Street address", "text", "street-address"),
        AddressField::Province => ("Province", "text", "address-level1"),
        AddressField::City => ("City", "text", "address-level2"),
        AddressField::PostalCode => ("Postal code", "text", "postal-code"),
        AddressField::Country => ("Country", "text", "country-name"),
    }
}

fn field_views(
    address: &FormAddress,
    fields: &[AddressField],
    errors: &ValidationErrors,
    billing: bool,
) -> Vec<FieldView> {
    fields
        .iter()
        .map(|&field| {
            let (label, input_type, autocomplete) = field_meta(field);
            let name = if billing {
                field.billing_key()
            } else {
                field.key().to_string()
            };

            FieldView {
                error: errors.get(&name).unwrap_or_default(),
                name,
                label,
                value: address.get(field).to_string(),
                input_type,
                autocomplete,
            }
        })
        .collect()
}

fn region_options(regions: &[ShippingRegion], form: &CheckoutForm) -> Vec<SelectOption> {
    let selected = form.selection().region();
    regions
        .iter()
        .filter(|region| region.is_active)
        .map(|region| SelectOption {
            value: region.name.clone(),
            label: region.name.clone(),
            selected: selected == Some(region.name.as_str()),
        })
        .collect()
}

fn city_options(regions: &[ShippingRegion], form: &CheckoutForm) -> Vec<SelectOption> {
    let Some(region) = form.selection().region() else {
        return Vec::new();
    };
    let selected = form.selection().city();

    select_region(regions, region)
        .into_iter()
        .map(|city| SelectOption {
            value: city.name.clone(),
            label: format!("{} ({})", city.name, city.charge().display()),
            selected: selected == Some(city.name.as_str()),
        })
        .collect()
}

// =============================================================================
// Templates
// =============================================================================

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutPageTemplate {
    pub nonce: String,
    pub lines: Vec<LineView>,
    pub summary: SummaryView,
    pub shipping_fields: Vec<FieldView>,
    pub billing_fields: Vec<FieldView>,
    pub same_as_shipping: bool,
    pub country: String,
    pub regions: Vec<SelectOption>,
    pub cities: Vec<SelectOption>,
    pub province_error: &'static str,
    pub city_error: &'static str,
    pub shipping_unavailable: bool,
    /// Banner above the form, empty for none.
    pub message: String,
}

impl CheckoutPageTemplate {
    /// `regions` is `None` when the shipping list could not be loaded; both
    /// selects are then disabled.
    fn new(
        cart: &CartSnapshot,
        regions: Option<&[ShippingRegion]>,
        form: &CheckoutForm,
        nonce: String,
        message: String,
    ) -> Self {
        let errors = form.errors();
        let regions_list = regions.unwrap_or_default();

        Self {
            nonce,
            lines: cart.items.iter().map(LineView::from).collect(),
            summary: SummaryView::new(cart, form),
            shipping_fields: field_views(form.shipping(), &SHIPPING_INPUTS, errors, false),
            billing_fields: field_views(&form.billing().address, &BILLING_INPUTS, errors, true),
            same_as_shipping: form.billing().same_as_shipping,
            country: form.shipping().country.clone(),
            regions: region_options(regions_list, form),
            cities: city_options(regions_list, form),
            province_error: errors.get(AddressField::Province.key()).unwrap_or_default(),
            city_error: errors.get(AddressField::City.key()).unwrap_or_default(),
            shipping_unavailable: regions.is_none(),
            message,
        }
    }
}

/// City select plus an out-of-band summary reset (HTMX fragment).
#[derive(Template, WebTemplate)]
#[template(path = "partials/checkout_cities.html")]
pub struct CitiesFragmentTemplate {
    pub cities: Vec<SelectOption>,
    pub city_error: &'static str,
    pub shipping_unavailable: bool,
    pub summary: SummaryView,
}

/// Order summary (HTMX fragment).
#[derive(Template, WebTemplate)]
#[template(path = "partials/checkout_summary.html")]
pub struct SummaryFragmentTemplate {
    pub summary: SummaryView,
}

/// Page shown when the customer returns from payment.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct SuccessTemplate {
    pub order_id: String,
    pub total: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub email: String,
}

impl From<&PendingOrder> for SuccessTemplate {
    fn from(order: &PendingOrder) -> Self {
        let info = &order.shipping_info;
        Self {
            order_id: order.order_id.to_string(),
            total: order.total_amount.display(),
            name: format!("{} {}", info.first_name, info.last_name),
            address: info.address.clone(),
            city: format!("{}, {}, {}", info.city, info.province, info.country),
            phone: info.phone.clone(),
            email: info.email.clone(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Redirect a full page, or tell htmx to navigate for a fragment request.
fn redirect(location: &str, htmx: bool) -> Response {
    if !htmx {
        return Redirect::to(location).into_response();
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert("hx-redirect", value);
    }
    response
}

/// The customer's cart, or the response to send instead: the cart page when
/// it is empty, sign-in when the backend no longer accepts the token.
async fn load_cart(
    state: &AppState,
    customer: &CurrentCustomer,
    htmx: bool,
) -> std::result::Result<CartSnapshot, Response> {
    match state
        .backend()
        .get_cart(customer.access_token.expose())
        .await
    {
        Ok(cart) if cart.is_empty() => Err(redirect(CART_PATH, htmx)),
        Ok(cart) => Ok(cart),
        Err(e) if e.is_unauthorized() => Err(redirect(&login_url(CHECKOUT_PATH), htmx)),
        Err(e) => Err(AppError::from(e).into_response()),
    }
}

/// The shipping region list, or `None` when it could not be loaded.
async fn load_regions(state: &AppState) -> Option<Arc<[ShippingRegion]>> {
    state
        .backend()
        .list_regions()
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Failed to load shipping regions"))
        .ok()
}

const fn failure_status(failure: &CheckoutFailure) -> StatusCode {
    match failure {
        CheckoutFailure::Invalid | CheckoutFailure::EmptyCart => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutFailure::AlreadyProcessing => StatusCode::CONFLICT,
        CheckoutFailure::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        CheckoutFailure::SessionExpired => StatusCode::UNAUTHORIZED,
        CheckoutFailure::OrderRejected(_) | CheckoutFailure::Handoff => StatusCode::BAD_GATEWAY,
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// Display the checkout page.
#[instrument(skip_all, fields(user_id = %customer.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    CspNonce(nonce): CspNonce,
) -> Response {
    set_sentry_user(&customer.id, Some(&customer.email));

    let cart = match load_cart(&state, &customer, false).await {
        Ok(cart) => cart,
        Err(response) => return response,
    };
    let regions = load_regions(&state).await;

    let mut form = CheckoutForm::new();
    form.set_shipping_field(AddressField::Email, customer.email.clone());

    let message = if regions.is_none() {
        SHIPPING_UNAVAILABLE_MESSAGE.to_string()
    } else {
        String::new()
    };

    CheckoutPageTemplate::new(&cart, regions.as_deref(), &form, nonce, message).into_response()
}

/// Province changed: offer its cities and reset the shipping charge.
#[instrument(skip_all, fields(user_id = %customer.id, province = %submission.province))]
pub async fn region(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    Form(submission): Form<CheckoutSubmission>,
) -> Response {
    let cart = match load_cart(&state, &customer, true).await {
        Ok(cart) => cart,
        Err(response) => return response,
    };
    let regions = load_regions(&state).await;
    let regions_list = regions.as_deref().unwrap_or_default();

    let mut form = CheckoutForm::from_submission(&submission, regions_list);
    form.select_region(regions_list, &submission.province);

    CitiesFragmentTemplate {
        cities: city_options(regions_list, &form),
        city_error: "",
        shipping_unavailable: regions.is_none(),
        summary: SummaryView::new(&cart, &form),
    }
    .into_response()
}

/// City changed: pick up its charge and refresh the summary.
#[instrument(skip_all, fields(user_id = %customer.id, city = %submission.city))]
pub async fn city(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    Form(submission): Form<CheckoutSubmission>,
) -> Response {
    let cart = match load_cart(&state, &customer, true).await {
        Ok(cart) => cart,
        Err(response) => return response,
    };
    let regions = load_regions(&state).await;
    let form = CheckoutForm::from_submission(&submission, regions.as_deref().unwrap_or_default());

    SummaryFragmentTemplate {
        summary: SummaryView::new(&cart, &form),
    }
    .into_response()
}

/// Place the order and hand the customer to the payment processor.
#[instrument(skip_all, fields(user_id = %customer.id))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    CspNonce(nonce): CspNonce,
    Form(submission): Form<CheckoutSubmission>,
) -> Result<Response> {
    set_sentry_user(&customer.id, Some(&customer.email));

    let cart = match load_cart(&state, &customer, false).await {
        Ok(cart) => cart,
        Err(response) => return Ok(response),
    };
    let regions = load_regions(&state).await;
    let mut form =
        CheckoutForm::from_submission(&submission, regions.as_deref().unwrap_or_default());

    let run = state.checkout().submit(&customer, &cart, &mut form).await;
    tracing::info!(states = ?run.history(), "Checkout submission finished");

    let failure = match run.into_state() {
        CheckoutState::Redirecting(order) => match order.handoff.execute(&nonce) {
            Ok(page) => {
                session
                    .insert(session_keys::PENDING_ORDER, &order.pending)
                    .await?;
                return Ok(page.into_response());
            }
            Err(e) => {
                tracing::error!(error = %e, order_id = %order.pending.order_id, "Payment handoff failed");
                CheckoutFailure::Handoff
            }
        },
        CheckoutState::Failed(CheckoutFailure::SessionExpired) => {
            return Ok(redirect(&login_url(CHECKOUT_PATH), false));
        }
        CheckoutState::Failed(CheckoutFailure::EmptyCart) => {
            return Ok(redirect(CART_PATH, false));
        }
        CheckoutState::Failed(failure) => failure,
        other @ (CheckoutState::Idle
        | CheckoutState::Validating
        | CheckoutState::RateLimitCheck
        | CheckoutState::Submitting) => {
            return Err(AppError::Internal(format!(
                "checkout stopped in {} state",
                other.name()
            )));
        }
    };

    let message = if regions.is_none() {
        SHIPPING_UNAVAILABLE_MESSAGE.to_string()
    } else {
        failure.to_string()
    };
    let page = CheckoutPageTemplate::new(&cart, regions.as_deref(), &form, nonce, message);

    Ok((failure_status(&failure), page).into_response())
}

/// Order confirmation after payment.
#[instrument(skip_all)]
pub async fn success(session: Session) -> Result<Response> {
    let Some(order) = session
        .get::<PendingOrder>(session_keys::PENDING_ORDER)
        .await?
    else {
        return Ok(Redirect::to("/").into_response());
    };

    Ok(SuccessTemplate::from(&order).into_response())
}
