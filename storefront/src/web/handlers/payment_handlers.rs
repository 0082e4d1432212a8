// storefront/src/web/handlers/payment_handlers.rs

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::pipelines::contexts::ConfirmationCtxData;
use crate::state::AppState;
use stepflow::{ContextData, PipelineResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
  pub token: Option<String>,
  pub order_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallbackForm {
  pub status: Option<String>,
  pub payment_id: Option<String>,
  pub conversation_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[instrument(name = "handler::payment_status", skip(app_state, query), fields(order_number = ?query.order_number))]
pub async fn payment_status_handler(
  app_state: web::Data<AppState>,
  query: web::Query<PaymentStatusQuery>,
) -> Result<HttpResponse, AppError> {
  let query = query.into_inner();
  let token = non_blank(query.token).ok_or_else(|| AppError::Validation("Missing payment token".to_string()))?;
  let order_number = non_blank(query.order_number);

  let context_data = ContextData::new(ConfirmationCtxData::new(app_state.get_ref().clone(), token, order_number));

  match app_state.pipelines.run(context_data.clone()).await {
    Ok(PipelineResult::Completed) => {
      let final_ctx_guard = context_data.read();
      let order_number = final_ctx_guard.order.as_ref().map(|o| o.order_number.clone());
      info!(?order_number, newly_paid = final_ctx_guard.newly_paid, "Payment confirmed.");
      Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "status": "success",
        "orderNumber": order_number,
      })))
    }
    Ok(PipelineResult::Stopped) => {
      let final_ctx_guard = context_data.read();
      let error = final_ctx_guard
        .failure
        .clone()
        .unwrap_or_else(|| "Payment could not be confirmed".to_string());
      info!(%error, "Payment confirmation did not succeed.");
      Ok(HttpResponse::Ok().json(json!({
        "success": false,
        "status": "failed",
        "error": error,
      })))
    }
    Err(app_err) => {
      warn!("Payment confirmation pipeline failed: {}", app_err);
      Err(app_err)
    }
  }
}

fn result_redirect(frontend_base_url: &str, params: &[(&str, &str)]) -> Result<HttpResponse, AppError> {
  let base = format!("{}/payment/result", frontend_base_url.trim_end_matches('/'));
  let location = reqwest::Url::parse_with_params(&base, params)
    .map_err(|e| AppError::Config(format!("Invalid FRONTEND_BASE_URL: {}", e)))?;
  Ok(
    HttpResponse::SeeOther()
      .insert_header((header::LOCATION, location.as_str()))
      .finish(),
  )
}

/// 3-D Secure return URL. Sends the browser back to the storefront, which then
/// calls the status endpoint.
#[instrument(name = "handler::payment_callback", skip(app_state, form), fields(status = ?form.status))]
pub async fn payment_callback_handler(
  app_state: web::Data<AppState>,
  form: web::Form<PaymentCallbackForm>,
) -> Result<HttpResponse, AppError> {
  let form = form.into_inner();
  let frontend = app_state.config.frontend_base_url.clone();

  let succeeded = form.status.as_deref().map(str::trim) == Some("success");
  let (Some(payment_id), Some(conversation_id), true) =
    (non_blank(form.payment_id), non_blank(form.conversation_id), succeeded)
  else {
    warn!("Gateway callback reported a failed or incomplete 3-D Secure authentication.");
    return result_redirect(&frontend, &[("error", "3-D Secure authentication failed")]);
  };

  match app_state.orders.find_by_reference(&conversation_id).await? {
    Some(order) => {
      info!(order_number = %order.order_number, "3-D Secure callback matched order.");
      result_redirect(&frontend, &[("token", payment_id.as_str()), ("orderNumber", order.order_number.as_str())])
    }
    None => {
      warn!("3-D Secure callback references an unknown conversation.");
      result_redirect(&frontend, &[("error", "Order not found")])
    }
  }
}
