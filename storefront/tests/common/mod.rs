// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

use storefront::config::{AppConfig, PaymentGatewayConfig, PricingConfig};
use storefront::models::CheckoutRequest;
use storefront::services::invoice_issuer::{InvoiceError, InvoiceIssuer, InvoicePayload, InvoiceReceipt};
use storefront::services::memory_order_store::MemoryOrderStore;
use storefront::services::payment_gateway::{
  ChargeOutcome, ChargeRequest, GatewayError, PaymentGateway, PaymentStatusOutcome,
};
use storefront::services::pricing::parse_minor;
use storefront::state::AppState;

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub const ADMIN_KEY: &str = "admin-secret";

pub fn test_config(with_gateway: bool) -> AppConfig {
  AppConfig {
    server_host: "127.0.0.1".to_string(),
    server_port: 8080,
    database_url: "postgres://unused".to_string(),
    app_base_url: "http://shop.test".to_string(),
    frontend_base_url: "http://front.test".to_string(),
    pricing: PricingConfig::default(),
    invoice_tax_rate: 20,
    payment: with_gateway.then(|| PaymentGatewayConfig {
      base_url: "http://gateway.test".to_string(),
      api_key: "api-key".to_string(),
      secret_key: "secret-key".to_string(),
      callback_url: "http://shop.test/payment/callback".to_string(),
      timeout: Duration::from_secs(5),
    }),
    invoice: None,
    invoice_retry_interval_secs: 0,
    admin_api_key: Some(ADMIN_KEY.to_string()),
  }
}

/// How the mock gateway answers a charge.
#[derive(Debug, Clone)]
pub enum ChargeBehaviour {
  Redirect,
  Challenge,
  Decline,
  Unavailable,
}

pub struct MockGateway {
  pub charge_behaviour: Mutex<ChargeBehaviour>,
  /// Forced status answer. When unset, the status is derived from the charges seen.
  pub status: Mutex<Option<PaymentStatusOutcome>>,
  pub charge_calls: AtomicUsize,
  pub status_calls: AtomicUsize,
  pub last_charge: Mutex<Option<ChargeRequest>>,
  pub charges: Mutex<Vec<ChargeRequest>>,
}

impl MockGateway {
  pub fn new(charge_behaviour: ChargeBehaviour) -> Arc<Self> {
    Arc::new(Self {
      charge_behaviour: Mutex::new(charge_behaviour),
      status: Mutex::new(None),
      charge_calls: AtomicUsize::new(0),
      status_calls: AtomicUsize::new(0),
      last_charge: Mutex::new(None),
      charges: Mutex::new(Vec::new()),
    })
  }

  pub fn set_status(&self, status: PaymentStatusOutcome) {
    *self.status.lock() = Some(status);
  }

  pub fn charge_calls(&self) -> usize {
    self.charge_calls.load(Ordering::SeqCst)
  }

  pub fn status_calls(&self) -> usize {
    self.status_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentGateway for MockGateway {
  async fn submit_charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
    self.charge_calls.fetch_add(1, Ordering::SeqCst);
    *self.last_charge.lock() = Some(request.clone());
    self.charges.lock().push(request.clone());
    let behaviour = self.charge_behaviour.lock().clone();
    match behaviour {
      ChargeBehaviour::Redirect => Ok(ChargeOutcome::Redirect {
        token: format!("gw-token-{}", request.conversation_id),
        payment_page_url: "https://gateway.test/pay".to_string(),
      }),
      ChargeBehaviour::Challenge => Ok(ChargeOutcome::Challenge {
        html_content: "<form>3ds</form>".to_string(),
        conversation_id: request.conversation_id.clone(),
      }),
      ChargeBehaviour::Decline => Ok(ChargeOutcome::Declined {
        code: Some("10051".to_string()),
        message: "Insufficient funds".to_string(),
      }),
      ChargeBehaviour::Unavailable => Err(GatewayError::Unavailable("simulated timeout".to_string())),
    }
  }

  async fn retrieve_status(&self, reference: &str) -> Result<PaymentStatusOutcome, GatewayError> {
    self.status_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(5)).await;
    if let Some(status) = self.status.lock().clone() {
      return Ok(status);
    }
    // A redirect token or a challenge conversation id identifies the charge it was issued for.
    let charges = self.charges.lock();
    let charge = charges
      .iter()
      .find(|c| reference == format!("gw-token-{}", c.conversation_id) || reference == c.conversation_id);
    Ok(match charge {
      Some(charge) => PaymentStatusOutcome::Paid {
        conversation_id: Some(charge.conversation_id.clone()),
        paid_amount: parse_minor(&charge.paid_price),
      },
      None => PaymentStatusOutcome::NotPaid {
        code: Some("5".to_string()),
        message: "Unknown payment".to_string(),
      },
    })
  }
}

pub struct MockIssuer {
  pub configured: bool,
  pub fail: Mutex<bool>,
  pub calls: AtomicUsize,
  pub payloads: Mutex<Vec<InvoicePayload>>,
  pub delay: Duration,
}

impl MockIssuer {
  pub fn new(configured: bool) -> Arc<Self> {
    Arc::new(Self {
      configured,
      fail: Mutex::new(false),
      calls: AtomicUsize::new(0),
      payloads: Mutex::new(Vec::new()),
      delay: Duration::from_millis(20),
    })
  }

  pub fn failing() -> Arc<Self> {
    let issuer = Self::new(true);
    *issuer.fail.lock() = true;
    issuer
  }

  pub fn set_failing(&self, fail: bool) {
    *self.fail.lock() = fail;
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl InvoiceIssuer for MockIssuer {
  fn is_configured(&self) -> bool {
    self.configured
  }

  async fn create_invoice(&self, payload: &InvoicePayload) -> Result<InvoiceReceipt, InvoiceError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    self.payloads.lock().push(payload.clone());
    tokio::time::sleep(self.delay).await;
    if *self.fail.lock() {
      return Err(InvoiceError::Unavailable("simulated outage".to_string()));
    }
    Ok(InvoiceReceipt {
      uuid: format!("inv-{}-{}", payload.external_id, call),
      pdf_url: Some(format!("https://invoices.test/{}.pdf", payload.external_id)),
    })
  }
}

pub struct TestApp {
  pub state: AppState,
  pub store: Arc<MemoryOrderStore>,
  pub gateway: Option<Arc<MockGateway>>,
  pub issuer: Arc<MockIssuer>,
}

pub fn build_test_app(gateway: Option<Arc<MockGateway>>, issuer: Arc<MockIssuer>) -> TestApp {
  setup_tracing();
  let store = Arc::new(MemoryOrderStore::new());
  let config = Arc::new(test_config(gateway.is_some()));
  let state = storefront::assemble_app_state(
    config,
    store.clone(),
    gateway.clone().map(|g| g as Arc<dyn PaymentGateway>),
    issuer.clone(),
  );
  TestApp {
    state,
    store,
    gateway,
    issuer,
  }
}

/// Test-mode app with a configured issuer.
pub fn test_mode_app() -> TestApp {
  build_test_app(None, MockIssuer::new(true))
}

pub fn live_app(behaviour: ChargeBehaviour) -> TestApp {
  build_test_app(Some(MockGateway::new(behaviour)), MockIssuer::new(true))
}

pub fn checkout_json(items: serde_json::Value) -> serde_json::Value {
  checkout_json_with_tc(items, "12345678901")
}

pub fn checkout_json_with_tc(items: serde_json::Value, tc: &str) -> serde_json::Value {
  serde_json::json!({
    "items": items,
    "customerInfo": {
      "name": "Ayse",
      "surname": "Yilmaz",
      "email": "ayse@example.com",
      "phone": "+905551112233",
      "tc": tc,
      "address": "Bagdat Cad. 1",
      "city": "Istanbul",
      "zipCode": "34000",
      "cardNumber": "5528 7900 0000 0008",
      "expireMonth": "12",
      "expireYear": "2030",
      "cvc": "123"
    }
  })
}

pub fn checkout_request(items: serde_json::Value) -> CheckoutRequest {
  serde_json::from_value(checkout_json(items)).expect("valid checkout request json")
}

pub fn scenario_items() -> serde_json::Value {
  serde_json::json!([{ "id": "p1", "name": "X", "price": 50000, "quantity": 1 }])
}
