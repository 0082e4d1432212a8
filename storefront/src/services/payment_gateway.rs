// storefront/src/services/payment_gateway.rs

//! Card payment gateway client. Provider responses are normalized into
//! `ChargeOutcome` / `PaymentStatusOutcome`; transport failures into `GatewayError`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::PaymentGatewayConfig;
use crate::services::pricing::parse_minor;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum GatewayError {
  /// Timeout, transport failure or 5xx. Safe to retry.
  #[error("payment gateway unavailable: {0}")]
  Unavailable(String),
  /// The gateway answered with something we could not interpret.
  #[error("unexpected payment gateway response: {0}")]
  Protocol(String),
}

impl GatewayError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, GatewayError::Unavailable(_))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
  Redirect { token: String, payment_page_url: String },
  Challenge { html_content: String, conversation_id: String },
  Declined { code: Option<String>, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatusOutcome {
  /// `conversation_id` and `paid_amount` (minor units) are what the gateway
  /// reports for the payment; either may be absent from its response.
  Paid {
    conversation_id: Option<String>,
    paid_amount: Option<i64>,
  },
  NotPaid { code: Option<String>, message: String },
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCard {
  pub card_holder_name: String,
  pub card_number: String,
  pub expire_month: String,
  pub expire_year: String,
  pub cvc: String,
}

impl std::fmt::Debug for PaymentCard {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let last4 = self.card_number.get(self.card_number.len().saturating_sub(4)..).unwrap_or("");
    f.debug_struct("PaymentCard").field("last4", &last4).finish_non_exhaustive()
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayBuyer {
  pub id: String,
  pub name: String,
  pub surname: String,
  pub email: String,
  pub gsm_number: String,
  pub identity_number: String,
  pub registration_address: String,
  pub city: String,
  pub country: String,
  pub zip_code: String,
  pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
  pub contact_name: String,
  pub address: String,
  pub city: String,
  pub country: String,
  pub zip_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketItem {
  pub id: String,
  pub name: String,
  pub category1: String,
  pub item_type: String,
  /// Decimal string with two fraction digits.
  pub price: String,
}

/// Provider-shaped charge request. Amounts are decimal strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
  pub locale: String,
  pub conversation_id: String,
  pub basket_id: String,
  pub price: String,
  pub paid_price: String,
  pub currency: String,
  pub installment: u32,
  pub payment_channel: String,
  pub payment_group: String,
  pub callback_url: String,
  pub payment_card: PaymentCard,
  pub buyer: GatewayBuyer,
  pub shipping_address: GatewayAddress,
  pub billing_address: GatewayAddress,
  pub basket_items: Vec<BasketItem>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn submit_charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;

  async fn retrieve_status(&self, reference: &str) -> Result<PaymentStatusOutcome, GatewayError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeResponseBody {
  status: String,
  error_code: Option<String>,
  error_message: Option<String>,
  token: Option<String>,
  payment_page_url: Option<String>,
  three_ds_html_content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponseBody {
  status: String,
  payment_status: Option<String>,
  conversation_id: Option<String>,
  /// Sent as a decimal string or a JSON number.
  paid_price: Option<serde_json::Value>,
  error_code: Option<String>,
  error_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequestBody<'a> {
  locale: &'a str,
  token: &'a str,
}

pub struct HttpPaymentGateway {
  client: reqwest::Client,
  config: PaymentGatewayConfig,
}

impl HttpPaymentGateway {
  pub fn new(config: PaymentGatewayConfig) -> Result<Self, GatewayError> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| GatewayError::Protocol(format!("failed to build HTTP client: {}", e)))?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// `HMACSHA256 base64(apiKey:..&randomKey:..&signature:hex(hmac(secret, randomKey + path + body)))`
  fn authorization(&self, random_key: &str, path: &str, body: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(self.config.secret_key.as_bytes())
      .map_err(|e| GatewayError::Protocol(format!("invalid signing key: {}", e)))?;
    mac.update(random_key.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    let params = format!(
      "apiKey:{}&randomKey:{}&signature:{}",
      self.config.api_key, random_key, signature
    );
    Ok(format!("HMACSHA256 {}", BASE64.encode(params)))
  }

  async fn post_signed<B, R>(&self, path: &str, body: &B) -> Result<R, GatewayError>
  where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
  {
    let payload = serde_json::to_string(body).map_err(|e| GatewayError::Protocol(e.to_string()))?;
    let random_key = format!("{}{}", chrono::Utc::now().timestamp_millis(), Uuid::new_v4().simple());
    let authorization = self.authorization(&random_key, path, &payload)?;

    let send = self
      .client
      .post(self.url(path))
      .header(reqwest::header::CONTENT_TYPE, "application/json")
      .header(reqwest::header::AUTHORIZATION, authorization)
      .header("x-random-key", &random_key)
      .body(payload)
      .send();

    let response = match tokio::time::timeout(self.config.timeout + Duration::from_secs(1), send).await {
      Err(_) => return Err(GatewayError::Unavailable(format!("{} timed out", path))),
      Ok(Err(e)) => return Err(GatewayError::Unavailable(format!("{}: {}", path, e))),
      Ok(Ok(response)) => response,
    };

    let status = response.status();
    if status.is_server_error() {
      return Err(GatewayError::Unavailable(format!("{} returned {}", path, status)));
    }
    let text = response
      .text()
      .await
      .map_err(|e| GatewayError::Unavailable(format!("{}: {}", path, e)))?;
    serde_json::from_str::<R>(&text).map_err(|e| {
      warn!(%status, raw_body = %text, "Unparseable payment gateway response");
      GatewayError::Protocol(format!("{} returned {}: {}", path, status, e))
    })
  }
}

fn parse_paid_price(raw: &str) -> Result<i64, GatewayError> {
  parse_minor(raw).ok_or_else(|| GatewayError::Protocol(format!("unparseable paidPrice {:?}", raw)))
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
  #[instrument(name = "gateway::submit_charge", skip(self, request), fields(conversation_id = %request.conversation_id, paid_price = %request.paid_price))]
  async fn submit_charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
    let body: ChargeResponseBody = self.post_signed("/payment/charge", request).await?;

    if body.status != "success" {
      warn!(error_code = ?body.error_code, error_message = ?body.error_message, "Charge declined by gateway");
      return Ok(ChargeOutcome::Declined {
        code: body.error_code,
        message: body.error_message.unwrap_or_else(|| "Payment was declined".to_string()),
      });
    }

    if let Some(html_content) = body.three_ds_html_content {
      info!("Gateway requires 3-D Secure authentication");
      return Ok(ChargeOutcome::Challenge {
        html_content,
        conversation_id: request.conversation_id.clone(),
      });
    }

    match (body.token, body.payment_page_url) {
      (Some(token), Some(payment_page_url)) => Ok(ChargeOutcome::Redirect { token, payment_page_url }),
      _ => Err(GatewayError::Protocol(
        "successful charge response without token or payment page".to_string(),
      )),
    }
  }

  #[instrument(name = "gateway::retrieve_status", skip(self, reference))]
  async fn retrieve_status(&self, reference: &str) -> Result<PaymentStatusOutcome, GatewayError> {
    let request = StatusRequestBody {
      locale: "tr",
      token: reference,
    };
    let body: StatusResponseBody = self.post_signed("/payment/retrieve", &request).await?;

    let paid = body.status == "success" && body.payment_status.as_deref() == Some("SUCCESS");
    if paid {
      let paid_amount = match &body.paid_price {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(raw)) => Some(parse_paid_price(raw)?),
        Some(serde_json::Value::Number(raw)) => Some(parse_paid_price(&raw.to_string())?),
        Some(other) => return Err(GatewayError::Protocol(format!("unexpected paidPrice {}", other))),
      };
      Ok(PaymentStatusOutcome::Paid {
        conversation_id: body.conversation_id,
        paid_amount,
      })
    } else {
      warn!(error_code = ?body.error_code, payment_status = ?body.payment_status, "Payment not completed");
      Ok(PaymentStatusOutcome::NotPaid {
        code: body.error_code,
        message: body.error_message.unwrap_or_else(|| "Payment was not completed".to_string()),
      })
    }
  }
}
