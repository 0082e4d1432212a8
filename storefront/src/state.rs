// storefront/src/state.rs
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::invoice_issuer::InvoiceIssuer;
use crate::services::order_store::OrderStore;
use crate::services::payment_gateway::PaymentGateway;
use std::sync::Arc;
use stepflow::Registry;

#[derive(Clone)]
pub struct AppState {
  pub orders: Arc<dyn OrderStore>,
  /// `None` runs checkout in test mode.
  pub payment_gateway: Option<Arc<dyn PaymentGateway>>,
  pub invoice_issuer: Arc<dyn InvoiceIssuer>,
  pub pipelines: Arc<Registry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  pub fn is_test_mode(&self) -> bool {
    self.payment_gateway.is_none()
  }
}
