// storefront/src/services/invoice_issuer.rs

//! E-archive invoice issuer client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::{InvoiceAuth, InvoiceIssuerConfig};

/// Tokens are refreshed this long before the provider says they expire.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum InvoiceError {
  #[error("invoice issuer is not configured")]
  NotConfigured,
  #[error("invoice issuer rejected credentials: {0}")]
  Auth(String),
  #[error("invoice issuer unavailable: {0}")]
  Unavailable(String),
  #[error("invoice rejected: {0}")]
  Rejected(String),
  #[error("unexpected invoice issuer response: {0}")]
  Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceReceipt {
  pub uuid: String,
  #[serde(default)]
  pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCustomer {
  pub name: String,
  pub surname: String,
  pub tax_number: String,
  pub email: String,
  pub phone: String,
  pub address: String,
  pub city: String,
  pub zip_code: String,
  pub country: String,
}

/// Amounts are decimal strings; rates are whole percentages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
  pub name: String,
  pub quantity: i64,
  pub unit_price: String,
  pub tax_rate: i64,
  pub tax_amount: String,
  pub line_total: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
  pub line_extension_amount: String,
  pub tax_total: String,
  pub payable_amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
  pub external_id: String,
  pub document_type: String,
  pub issue_date: DateTime<Utc>,
  pub currency: String,
  pub customer: InvoiceCustomer,
  pub lines: Vec<InvoiceLine>,
  pub totals: InvoiceTotals,
}

#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
  fn is_configured(&self) -> bool;

  async fn create_invoice(&self, payload: &InvoicePayload) -> Result<InvoiceReceipt, InvoiceError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
  access_token: String,
  expires_at: DateTime<Utc>,
}

/// Bearer token cache owned by one client. The mutex is held across the refresh
/// request so concurrent callers wait for a single token fetch.
#[derive(Debug, Default)]
pub struct TokenCache {
  slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn get_or_refresh<F, Fut>(&self, now: DateTime<Utc>, refresh: F) -> Result<String, InvoiceError>
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(String, Duration), InvoiceError>>,
  {
    let mut slot = self.slot.lock().await;
    if let Some(cached) = slot.as_ref() {
      if cached.expires_at > now {
        return Ok(cached.access_token.clone());
      }
    }
    let (access_token, ttl) = refresh().await?;
    let ttl = ttl.saturating_sub(TOKEN_EXPIRY_SKEW);
    let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
    *slot = Some(CachedToken {
      access_token: access_token.clone(),
      expires_at,
    });
    Ok(access_token)
  }

  pub async fn invalidate(&self) {
    *self.slot.lock().await = None;
  }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
  #[serde(alias = "error_description")]
  message: Option<String>,
}

pub struct HttpInvoiceIssuer {
  client: reqwest::Client,
  config: Option<InvoiceIssuerConfig>,
  token_cache: TokenCache,
}

impl HttpInvoiceIssuer {
  pub fn new(config: Option<InvoiceIssuerConfig>) -> Result<Self, InvoiceError> {
    let timeout = config.as_ref().map_or(Duration::from_secs(30), |c| c.timeout);
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| InvoiceError::Protocol(format!("failed to build HTTP client: {}", e)))?;
    Ok(Self {
      client,
      config,
      token_cache: TokenCache::new(),
    })
  }

  fn url(config: &InvoiceIssuerConfig, path: &str) -> String {
    format!("{}{}", config.base_url.trim_end_matches('/'), path)
  }

  async fn send_bounded(
    config: &InvoiceIssuerConfig,
    request: reqwest::RequestBuilder,
  ) -> Result<reqwest::Response, InvoiceError> {
    match tokio::time::timeout(config.timeout + Duration::from_secs(1), request.send()).await {
      Err(_) => Err(InvoiceError::Unavailable("request timed out".to_string())),
      Ok(Err(e)) => Err(InvoiceError::Unavailable(e.to_string())),
      Ok(Ok(response)) => Ok(response),
    }
  }

  #[instrument(name = "invoice::fetch_token", skip_all)]
  async fn fetch_token(
    &self,
    config: &InvoiceIssuerConfig,
    client_id: &str,
    client_secret: &str,
  ) -> Result<(String, Duration), InvoiceError> {
    let request = self.client.post(Self::url(config, "/oauth/token")).form(&[
      ("grant_type", "client_credentials"),
      ("client_id", client_id),
      ("client_secret", client_secret),
    ]);
    let response = Self::send_bounded(config, request).await?;
    let status = response.status();
    if status.is_server_error() {
      return Err(InvoiceError::Unavailable(format!("token endpoint returned {}", status)));
    }
    if !status.is_success() {
      return Err(InvoiceError::Auth(format!("token endpoint returned {}", status)));
    }
    let body: TokenResponse = response
      .json()
      .await
      .map_err(|e| InvoiceError::Protocol(format!("token response: {}", e)))?;
    debug!(expires_in = ?body.expires_in, "Fetched invoice issuer token");
    Ok((body.access_token, Duration::from_secs(body.expires_in.unwrap_or(3600))))
  }

  async fn authorize(
    &self,
    config: &InvoiceIssuerConfig,
    request: reqwest::RequestBuilder,
  ) -> Result<reqwest::RequestBuilder, InvoiceError> {
    match &config.auth {
      InvoiceAuth::ApiKey(key) => Ok(request.header("X-Api-Key", key)),
      InvoiceAuth::ClientCredentials {
        client_id,
        client_secret,
      } => {
        let token = self
          .token_cache
          .get_or_refresh(Utc::now(), || self.fetch_token(config, client_id, client_secret))
          .await?;
        Ok(request.bearer_auth(token))
      }
    }
  }
}

#[async_trait]
impl InvoiceIssuer for HttpInvoiceIssuer {
  fn is_configured(&self) -> bool {
    self.config.is_some()
  }

  #[instrument(name = "invoice::create_invoice", skip(self, payload), fields(external_id = %payload.external_id))]
  async fn create_invoice(&self, payload: &InvoicePayload) -> Result<InvoiceReceipt, InvoiceError> {
    let config = self.config.as_ref().ok_or(InvoiceError::NotConfigured)?;

    let request = self.client.post(Self::url(config, "/invoices")).json(payload);
    let request = self.authorize(config, request).await?;
    let response = Self::send_bounded(config, request).await?;

    let status = response.status();
    if status.is_server_error() {
      return Err(InvoiceError::Unavailable(format!("issuer returned {}", status)));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
      self.token_cache.invalidate().await;
      return Err(InvoiceError::Auth(format!("issuer returned {}", status)));
    }
    let text = response
      .text()
      .await
      .map_err(|e| InvoiceError::Unavailable(e.to_string()))?;
    if !status.is_success() {
      warn!(%status, raw_body = %text, "Invoice rejected by issuer");
      let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| format!("issuer returned {}", status));
      return Err(InvoiceError::Rejected(message));
    }

    let receipt: InvoiceReceipt = serde_json::from_str(&text).map_err(|e| {
      warn!(raw_body = %text, "Unparseable invoice issuer response");
      InvoiceError::Protocol(e.to_string())
    })?;
    info!(invoice_uuid = %receipt.uuid, "Invoice issued");
    Ok(receipt)
  }
}
