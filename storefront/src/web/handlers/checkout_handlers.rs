// storefront/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::CheckoutRequest;
use crate::pipelines::contexts::{CheckoutCtxData, CheckoutOutcome};
use crate::state::AppState;
use crate::web::extractors::client_ip;
use stepflow::{ContextData, PipelineResult};

#[instrument(
    name = "handler::start_checkout",
    skip(app_state, req, payload),
    fields(items = payload.items.len(), guest = payload.user_id.is_none())
)]
pub async fn start_checkout_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  payload: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
  let checkout_ctx_initial = CheckoutCtxData::new(app_state.get_ref().clone(), payload.into_inner(), client_ip(&req));
  let context_data = ContextData::new(checkout_ctx_initial);

  match app_state.pipelines.run(context_data.clone()).await {
    Ok(PipelineResult::Completed) => {
      let final_ctx_guard = context_data.read();
      let order_number = final_ctx_guard.order_number.clone().unwrap_or_default();
      match &final_ctx_guard.outcome {
        Some(CheckoutOutcome::Redirect { token, payment_page_url }) => {
          info!(%order_number, "Checkout started; redirecting buyer to payment page.");
          Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "token": token,
            "paymentPageUrl": payment_page_url,
            "orderNumber": order_number,
          })))
        }
        Some(CheckoutOutcome::Challenge {
          html_content,
          conversation_id,
        }) => {
          info!(%order_number, "Checkout started; 3-D Secure challenge required.");
          Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "requires3DS": true,
            "threeDSHtmlContent": html_content,
            "conversationId": conversation_id,
            "orderNumber": order_number,
          })))
        }
        Some(CheckoutOutcome::Declined { .. }) | None => {
          warn!(%order_number, "Checkout pipeline completed without a payment instruction.");
          Err(AppError::Internal("Checkout completed without a payment instruction".to_string()))
        }
      }
    }
    Ok(PipelineResult::Stopped) => {
      let final_ctx_guard = context_data.read();
      match &final_ctx_guard.outcome {
        Some(CheckoutOutcome::Declined { code, message }) => Err(AppError::PaymentDeclined {
          code: code.clone(),
          message: message.clone(),
        }),
        _ => Err(AppError::Internal("Checkout was halted".to_string())),
      }
    }
    Err(app_err) => {
      warn!("Checkout pipeline failed: {}", app_err);
      Err(app_err)
    }
  }
}
