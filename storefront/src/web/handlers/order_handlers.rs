// storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::models::OrderSummary;
use crate::state::AppState;

#[instrument(name = "handler::get_order", skip(app_state))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  order_number: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order_number = order_number.into_inner();
  let order = app_state
    .orders
    .find_by_number(&order_number)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_number)))?;

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "order": OrderSummary::from(&order),
  })))
}
