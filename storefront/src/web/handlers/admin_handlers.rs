// storefront/src/web/handlers/admin_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::{OrderListQuery, OrderStatus, OrderSummary, TransitionOutcome};
use crate::services::invoicing::{issue_for_order, InvoiceAttempt};
use crate::state::AppState;
use crate::web::extractors::AdminAccess;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
  pub status: Option<String>,
  pub page: Option<i64>,
  pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusPayload {
  pub status: String,
}

fn parse_status(raw: &str) -> Result<OrderStatus, AppError> {
  raw.parse::<OrderStatus>().map_err(AppError::Validation)
}

#[instrument(name = "handler::admin_list_orders", skip(app_state, _admin))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  _admin: AdminAccess,
  params: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
  let params = params.into_inner();
  let status = match params.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
    Some(raw) => Some(parse_status(raw)?),
    None => None,
  };
  let query = OrderListQuery {
    status,
    page: params.page.unwrap_or(1).max(1),
    per_page: params.per_page.unwrap_or(20).clamp(1, 100),
  };
  if query.offset().is_none() {
    return Err(AppError::Validation("page is out of range".to_string()));
  }

  let page = app_state.orders.list(&query).await?;
  let orders: Vec<OrderSummary> = page.orders.iter().map(OrderSummary::from).collect();
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "orders": orders,
    "page": query.page,
    "perPage": query.per_page,
    "total": page.total,
  })))
}

#[instrument(name = "handler::admin_update_status", skip(app_state, _admin, payload))]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  _admin: AdminAccess,
  order_number: web::Path<String>,
  payload: web::Json<UpdateStatusPayload>,
) -> Result<HttpResponse, AppError> {
  let order_number = order_number.into_inner();
  let next = parse_status(&payload.status)?;

  match app_state.orders.transition_status(&order_number, next).await? {
    TransitionOutcome::Applied(order) => {
      info!(%order_number, status = %order.status, "Order status changed.");
      Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "order": OrderSummary::from(&order),
      })))
    }
    TransitionOutcome::NotAllowed { current } => Err(AppError::Conflict(format!(
      "Cannot move order from {} to {}",
      current, next
    ))),
    TransitionOutcome::NotFound => Err(AppError::NotFound(format!("Order {} not found", order_number))),
  }
}

#[instrument(name = "handler::admin_retry_invoice", skip(app_state, _admin))]
pub async fn retry_invoice_handler(
  app_state: web::Data<AppState>,
  _admin: AdminAccess,
  order_number: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order_number = order_number.into_inner();
  let order = app_state
    .orders
    .find_by_number(&order_number)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_number)))?;
  if let Some(invoice_uuid) = &order.invoice_uuid {
    return Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "invoiceUuid": invoice_uuid,
      "pdfUrl": order.invoice_pdf_url,
      "alreadyInvoiced": true,
    })));
  }

  let attempt = issue_for_order(
    app_state.orders.as_ref(),
    app_state.invoice_issuer.as_ref(),
    app_state.config.invoice_tax_rate,
    &order_number,
  )
  .await?;

  match attempt {
    InvoiceAttempt::Issued(receipt) => Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "invoiceUuid": receipt.uuid,
      "pdfUrl": receipt.pdf_url,
      "alreadyInvoiced": false,
    }))),
    InvoiceAttempt::Disabled => Err(AppError::Conflict("Invoicing is not configured".to_string())),
    InvoiceAttempt::NotEligible => Err(AppError::Conflict(format!(
      "Order {} is not eligible for invoicing",
      order_number
    ))),
    InvoiceAttempt::Failed(reason) => {
      warn!(%order_number, %reason, "Invoice retry failed.");
      Ok(HttpResponse::BadGateway().json(json!({
        "success": false,
        "error": "Invoice could not be issued",
      })))
    }
  }
}
