// storefront/src/lib.rs

//! Cosmetics storefront back end: checkout, payment confirmation and
//! e-archive invoicing, orchestrated as `stepflow` pipelines behind actix-web.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod web;

use std::sync::Arc;
use stepflow::Registry;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::services::invoice_issuer::{HttpInvoiceIssuer, InvoiceIssuer};
use crate::services::order_store::OrderStore;
use crate::services::payment_gateway::{HttpPaymentGateway, PaymentGateway};
use crate::state::AppState;

/// Builds the shared state with HTTP provider clients and registers all pipelines.
pub fn build_app_state(config: Arc<AppConfig>, orders: Arc<dyn OrderStore>) -> Result<AppState> {
  let payment_gateway: Option<Arc<dyn PaymentGateway>> = match &config.payment {
    Some(payment_config) => Some(Arc::new(HttpPaymentGateway::new(payment_config.clone())?)),
    None => None,
  };
  let invoice_issuer: Arc<dyn InvoiceIssuer> = Arc::new(HttpInvoiceIssuer::new(config.invoice.clone())?);
  Ok(assemble_app_state(config, orders, payment_gateway, invoice_issuer))
}

/// Wires already-built collaborators into an `AppState` with registered pipelines.
pub fn assemble_app_state(
  config: Arc<AppConfig>,
  orders: Arc<dyn OrderStore>,
  payment_gateway: Option<Arc<dyn PaymentGateway>>,
  invoice_issuer: Arc<dyn InvoiceIssuer>,
) -> AppState {
  let registry = Arc::new(Registry::<AppError>::new());
  let app_state = AppState {
    orders,
    payment_gateway,
    invoice_issuer,
    pipelines: registry.clone(),
    config,
  };
  pipelines::register_all_pipelines(&registry, &app_state);
  app_state
}
