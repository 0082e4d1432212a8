// storefront/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  /// Public base URL of this service; used for the test-mode payment page and the gateway callback.
  pub app_base_url: String,
  /// Where the buyer's browser is sent after the 3-D Secure callback.
  pub frontend_base_url: String,

  pub pricing: PricingConfig,
  /// VAT percentage applied when issuing invoices.
  pub invoice_tax_rate: i64,

  /// `None` runs checkout in test mode.
  pub payment: Option<PaymentGatewayConfig>,
  /// `None` disables invoice issuance.
  pub invoice: Option<InvoiceIssuerConfig>,
  /// Sweeper period in seconds; 0 disables it.
  pub invoice_retry_interval_secs: u64,

  pub admin_api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
  pub free_shipping_threshold: i64,
  pub flat_shipping_fee: i64,
  pub currency: String,
}

impl Default for PricingConfig {
  fn default() -> Self {
    Self {
      free_shipping_threshold: 149_900,
      flat_shipping_fee: 10_000,
      currency: "TRY".to_string(),
    }
  }
}

#[derive(Clone)]
pub struct PaymentGatewayConfig {
  pub base_url: String,
  pub api_key: String,
  pub secret_key: String,
  pub callback_url: String,
  pub timeout: Duration,
}

impl std::fmt::Debug for PaymentGatewayConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PaymentGatewayConfig")
      .field("base_url", &self.base_url)
      .field("api_key", &"[REDACTED]")
      .field("secret_key", &"[REDACTED]")
      .field("callback_url", &self.callback_url)
      .field("timeout", &self.timeout)
      .finish()
  }
}

#[derive(Clone)]
pub enum InvoiceAuth {
  ApiKey(String),
  ClientCredentials { client_id: String, client_secret: String },
}

impl std::fmt::Debug for InvoiceAuth {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      InvoiceAuth::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
      InvoiceAuth::ClientCredentials { client_id, .. } => f
        .debug_struct("ClientCredentials")
        .field("client_id", client_id)
        .field("client_secret", &"[REDACTED]")
        .finish(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct InvoiceIssuerConfig {
  pub base_url: String,
  pub auth: InvoiceAuth,
  pub timeout: Duration,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };
    let get_opt = |var_name: &str| env::var(var_name).ok().filter(|v| !v.trim().is_empty());

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let app_base_url = get_opt("APP_BASE_URL").unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));
    let frontend_base_url = get_opt("FRONTEND_BASE_URL").unwrap_or_else(|| app_base_url.clone());

    let defaults = PricingConfig::default();
    let pricing = PricingConfig {
      free_shipping_threshold: parse_or("FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
      flat_shipping_fee: parse_or("FLAT_SHIPPING_FEE", defaults.flat_shipping_fee)?,
      currency: get_opt("CURRENCY").unwrap_or(defaults.currency),
    };
    if pricing.free_shipping_threshold < 0 || pricing.flat_shipping_fee < 0 {
      return Err(AppError::Config(
        "FREE_SHIPPING_THRESHOLD and FLAT_SHIPPING_FEE must not be negative".to_string(),
      ));
    }

    let invoice_tax_rate: i64 = parse_or("INVOICE_TAX_RATE", 20)?;
    if !(0..=100).contains(&invoice_tax_rate) {
      return Err(AppError::Config(format!("Invalid INVOICE_TAX_RATE: {}", invoice_tax_rate)));
    }

    let payment = match (get_opt("PAYMENT_API_KEY"), get_opt("PAYMENT_SECRET_KEY")) {
      (Some(api_key), Some(secret_key)) => Some(PaymentGatewayConfig {
        base_url: get_env("PAYMENT_BASE_URL")?,
        api_key,
        secret_key,
        callback_url: get_opt("PAYMENT_CALLBACK_URL").unwrap_or_else(|| format!("{}/payment/callback", app_base_url)),
        timeout: Duration::from_secs(parse_or("PAYMENT_TIMEOUT_SECS", 20)?),
      }),
      _ => {
        tracing::warn!("PAYMENT_API_KEY/PAYMENT_SECRET_KEY not set; checkout runs in test mode.");
        None
      }
    };

    let invoice_enabled: bool = parse_or("INVOICE_ENABLED", false)?;
    let invoice = if invoice_enabled {
      let auth = match (
        get_opt("INVOICE_API_KEY"),
        get_opt("INVOICE_CLIENT_ID"),
        get_opt("INVOICE_CLIENT_SECRET"),
      ) {
        (Some(key), _, _) => InvoiceAuth::ApiKey(key),
        (None, Some(client_id), Some(client_secret)) => InvoiceAuth::ClientCredentials {
          client_id,
          client_secret,
        },
        _ => {
          return Err(AppError::Config(
            "INVOICE_ENABLED requires INVOICE_API_KEY or INVOICE_CLIENT_ID and INVOICE_CLIENT_SECRET".to_string(),
          ))
        }
      };
      Some(InvoiceIssuerConfig {
        base_url: get_env("INVOICE_BASE_URL")?,
        auth,
        timeout: Duration::from_secs(parse_or("INVOICE_TIMEOUT_SECS", 30)?),
      })
    } else {
      None
    };

    let invoice_retry_interval_secs = parse_or("INVOICE_RETRY_INTERVAL_SECS", 0)?;
    let admin_api_key = get_opt("ADMIN_API_KEY");

    tracing::info!(
      payment_configured = payment.is_some(),
      invoice_configured = invoice.is_some(),
      invoice_retry_interval_secs,
      "Application configuration loaded successfully."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      frontend_base_url,
      pricing,
      invoice_tax_rate,
      payment,
      invoice,
      invoice_retry_interval_secs,
      admin_api_key,
    })
  }
}

fn parse_or<T>(var_name: &str, default: T) -> Result<T>
where
  T: std::str::FromStr,
  T::Err: std::fmt::Display,
{
  match env::var(var_name) {
    Ok(raw) if !raw.trim().is_empty() => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e))),
    _ => Ok(default),
  }
}
