// storefront/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::services::invoice_issuer::InvoiceError;
use crate::services::payment_gateway::GatewayError;
use stepflow::FlowError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Payment declined ({code:?}): {message}")]
  PaymentDeclined { code: Option<String>, message: String },

  #[error("Payment provider unavailable: {0}")]
  PaymentUnavailable(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Invoice Error: {0}")]
  Invoice(#[from] InvoiceError),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<GatewayError> for AppError {
  fn from(err: GatewayError) -> Self {
    match err {
      GatewayError::Unavailable(detail) => AppError::PaymentUnavailable(detail),
      GatewayError::Protocol(detail) => AppError::Internal(format!("Payment provider protocol error: {}", detail)),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(db_err) => AppError::Sqlx(db_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl AppError {
  /// Short buyer-facing message. Provider and database detail stays in the logs.
  pub fn public_message(&self) -> String {
    match self {
      AppError::Validation(m) | AppError::Auth(m) | AppError::NotFound(m) | AppError::Conflict(m) => m.clone(),
      AppError::PaymentDeclined { message, .. } => message.clone(),
      AppError::PaymentUnavailable(_) => "Payment service is temporarily unavailable, please try again.".to_string(),
      AppError::Invoice(_) => "Invoice could not be issued.".to_string(),
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        "An internal error occurred.".to_string()
      }
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) | AppError::PaymentDeclined { .. } => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::PaymentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Invoice(_) => StatusCode::BAD_GATEWAY,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    match self {
      AppError::Validation(_) | AppError::Auth(_) | AppError::NotFound(_) | AppError::Conflict(_) => {
        tracing::info!(application_error = %self, "Responding with client error");
      }
      AppError::PaymentDeclined { code, message } => {
        tracing::warn!(decline_code = ?code, decline_message = %message, "Responding with payment decline");
      }
      _ => tracing::error!(application_error = %self, "Responding with error"),
    }
    HttpResponse::build(self.status_code()).json(json!({
      "success": false,
      "error": self.public_message(),
    }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
