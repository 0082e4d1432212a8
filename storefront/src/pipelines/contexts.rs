// storefront/src/pipelines/contexts.rs

//! Context data for the checkout and payment confirmation pipelines.
//! Handlers receive these wrapped in `stepflow::ContextData`.

use crate::models::{CheckoutRequest, LineItem, Order};
use crate::services::invoicing::InvoiceAttempt;
use crate::services::order_store::PaymentMatch;
use crate::services::payment_gateway::ChargeRequest;
use crate::services::pricing::OrderTotals;
use crate::state::AppState;
use uuid::Uuid;

/// Result of a checkout run, as reported back to the buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
  Redirect { token: String, payment_page_url: String },
  Challenge { html_content: String, conversation_id: String },
  Declined { code: Option<String>, message: String },
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub request: CheckoutRequest,
  pub client_ip: String,
  pub line_items: Vec<LineItem>,
  pub totals: Option<OrderTotals>,
  pub order_id: Option<Uuid>,
  pub order_number: Option<String>,
  pub conversation_id: Option<String>,
  pub charge_request: Option<ChargeRequest>,
  pub outcome: Option<CheckoutOutcome>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, request: CheckoutRequest, client_ip: String) -> Self {
    Self {
      app_state,
      request,
      client_ip,
      line_items: Vec::new(),
      totals: None,
      order_id: None,
      order_number: None,
      conversation_id: None,
      charge_request: None,
      outcome: None,
    }
  }
}

#[derive(Clone)]
pub struct ConfirmationCtxData {
  pub app_state: AppState,
  pub token: String,
  pub order_number: Option<String>,
  /// The confirmed payment, set once the gateway (or test mode) reports it paid.
  pub payment: Option<PaymentMatch>,
  /// Buyer-facing reason when the payment cannot be confirmed.
  pub failure: Option<String>,
  /// Whether this run performed the pending -> paid transition.
  pub newly_paid: bool,
  pub order: Option<Order>,
  pub invoice: Option<InvoiceAttempt>,
}

impl ConfirmationCtxData {
  pub fn new(app_state: AppState, token: String, order_number: Option<String>) -> Self {
    Self {
      app_state,
      token,
      order_number,
      payment: None,
      failure: None,
      newly_paid: false,
      order: None,
      invoice: None,
    }
  }
}
