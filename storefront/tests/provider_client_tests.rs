// tests/provider_client_tests.rs
mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::setup_tracing;
use storefront::config::{InvoiceAuth, InvoiceIssuerConfig, PaymentGatewayConfig};
use storefront::services::invoice_issuer::{
  HttpInvoiceIssuer, InvoiceCustomer, InvoiceError, InvoiceIssuer, InvoiceLine, InvoicePayload, InvoiceTotals,
  TokenCache,
};
use storefront::services::payment_gateway::{
  BasketItem, ChargeOutcome, ChargeRequest, GatewayAddress, GatewayBuyer, GatewayError, HttpPaymentGateway,
  PaymentCard, PaymentGateway, PaymentStatusOutcome,
};

fn gateway_for(server: &MockServer, timeout: Duration) -> HttpPaymentGateway {
  HttpPaymentGateway::new(PaymentGatewayConfig {
    base_url: server.uri(),
    api_key: "api-key".to_string(),
    secret_key: "secret-key".to_string(),
    callback_url: "http://shop.test/payment/callback".to_string(),
    timeout,
  })
  .expect("gateway client builds")
}

fn charge_request() -> ChargeRequest {
  let address = GatewayAddress {
    contact_name: "Ayse Yilmaz".to_string(),
    address: "Bagdat Cad. 1".to_string(),
    city: "Istanbul".to_string(),
    country: "Turkey".to_string(),
    zip_code: "34000".to_string(),
  };
  ChargeRequest {
    locale: "tr".to_string(),
    conversation_id: "conv-1".to_string(),
    basket_id: "ORD-20261016-ABCDEF0123".to_string(),
    price: "600.00".to_string(),
    paid_price: "600.00".to_string(),
    currency: "TRY".to_string(),
    installment: 1,
    payment_channel: "WEB".to_string(),
    payment_group: "PRODUCT".to_string(),
    callback_url: "http://shop.test/payment/callback".to_string(),
    payment_card: PaymentCard {
      card_holder_name: "Ayse Yilmaz".to_string(),
      card_number: "5528790000000008".to_string(),
      expire_month: "12".to_string(),
      expire_year: "2030".to_string(),
      cvc: "123".to_string(),
    },
    buyer: GatewayBuyer {
      id: "guest".to_string(),
      name: "Ayse".to_string(),
      surname: "Yilmaz".to_string(),
      email: "ayse@example.com".to_string(),
      gsm_number: "+905551112233".to_string(),
      identity_number: "12345678901".to_string(),
      registration_address: "Bagdat Cad. 1".to_string(),
      city: "Istanbul".to_string(),
      country: "Turkey".to_string(),
      zip_code: "34000".to_string(),
      ip: "10.0.0.1".to_string(),
    },
    shipping_address: address.clone(),
    billing_address: address,
    basket_items: vec![
      BasketItem {
        id: "p1".to_string(),
        name: "X".to_string(),
        category1: "Cosmetics".to_string(),
        item_type: "PHYSICAL".to_string(),
        price: "500.00".to_string(),
      },
      BasketItem {
        id: "shipping".to_string(),
        name: "Shipping".to_string(),
        category1: "Shipping".to_string(),
        item_type: "PHYSICAL".to_string(),
        price: "100.00".to_string(),
      },
    ],
  }
}

#[tokio::test]
async fn test_charge_redirect_is_signed() {
  setup_tracing();
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/payment/charge"))
    .and(header_exists("x-random-key"))
    .and(body_partial_json(json!({ "conversationId": "conv-1", "paidPrice": "600.00" })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "success",
      "token": "tok-123",
      "paymentPageUrl": "https://gateway.test/pay/tok-123"
    })))
    .expect(1)
    .mount(&server)
    .await;

  let gateway = gateway_for(&server, Duration::from_secs(5));
  let outcome = gateway.submit_charge(&charge_request()).await.unwrap();
  assert_eq!(
    outcome,
    ChargeOutcome::Redirect {
      token: "tok-123".to_string(),
      payment_page_url: "https://gateway.test/pay/tok-123".to_string(),
    }
  );

  let requests = server.received_requests().await.unwrap();
  let request = &requests[0];
  let random_key = request.headers.get("x-random-key").unwrap().to_str().unwrap().to_string();
  let authorization = request.headers.get("authorization").unwrap().to_str().unwrap().to_string();
  let encoded = authorization.strip_prefix("HMACSHA256 ").expect("HMACSHA256 scheme");
  let decoded = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();

  let mut mac = Hmac::<Sha256>::new_from_slice(b"secret-key").unwrap();
  mac.update(random_key.as_bytes());
  mac.update(b"/payment/charge");
  mac.update(&request.body);
  let signature = hex::encode(mac.finalize().into_bytes());
  assert_eq!(
    decoded,
    format!("apiKey:api-key&randomKey:{}&signature:{}", random_key, signature)
  );
}

#[tokio::test]
async fn test_charge_challenge_carries_conversation_id() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/payment/charge"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "success",
      "threeDSHtmlContent": "<form>3ds</form>"
    })))
    .mount(&server)
    .await;

  let outcome = gateway_for(&server, Duration::from_secs(5))
    .submit_charge(&charge_request())
    .await
    .unwrap();
  assert_eq!(
    outcome,
    ChargeOutcome::Challenge {
      html_content: "<form>3ds</form>".to_string(),
      conversation_id: "conv-1".to_string(),
    }
  );
}

#[tokio::test]
async fn test_charge_decline_is_an_outcome_not_an_error() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/payment/charge"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "failure",
      "errorCode": "10051",
      "errorMessage": "Insufficient funds"
    })))
    .mount(&server)
    .await;

  let outcome = gateway_for(&server, Duration::from_secs(5))
    .submit_charge(&charge_request())
    .await
    .unwrap();
  assert_eq!(
    outcome,
    ChargeOutcome::Declined {
      code: Some("10051".to_string()),
      message: "Insufficient funds".to_string(),
    }
  );
}

#[tokio::test]
async fn test_charge_server_error_is_retryable() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/payment/charge"))
    .respond_with(ResponseTemplate::new(502))
    .mount(&server)
    .await;

  let err = gateway_for(&server, Duration::from_secs(5))
    .submit_charge(&charge_request())
    .await
    .unwrap_err();
  assert!(matches!(err, GatewayError::Unavailable(_)));
  assert!(err.is_retryable());
}

#[tokio::test]
async fn test_charge_timeout_is_unavailable() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/payment/charge"))
    .respond_with(
      ResponseTemplate::new(200)
        .set_body_json(json!({ "status": "success", "token": "t", "paymentPageUrl": "u" }))
        .set_delay(Duration::from_millis(800)),
    )
    .mount(&server)
    .await;

  let err = gateway_for(&server, Duration::from_millis(100))
    .submit_charge(&charge_request())
    .await
    .unwrap_err();
  assert!(matches!(err, GatewayError::Unavailable(_)));
}

#[tokio::test]
async fn test_charge_garbage_body_is_protocol_error() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/payment/charge"))
    .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
    .mount(&server)
    .await;

  let err = gateway_for(&server, Duration::from_secs(5))
    .submit_charge(&charge_request())
    .await
    .unwrap_err();
  assert!(matches!(err, GatewayError::Protocol(_)));
  assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_retrieve_status_requires_success_payment_status() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/payment/retrieve"))
    .and(body_partial_json(json!({ "token": "tok-paid" })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "success",
      "paymentStatus": "SUCCESS",
      "conversationId": "conv-1",
      "paidPrice": "600.00"
    })))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/payment/retrieve"))
    .and(body_partial_json(json!({ "token": "tok-numeric" })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "success",
      "paymentStatus": "SUCCESS",
      "paidPrice": 19.9
    })))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/payment/retrieve"))
    .and(body_partial_json(json!({ "token": "tok-garbled" })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "success",
      "paymentStatus": "SUCCESS",
      "paidPrice": "six hundred"
    })))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/payment/retrieve"))
    .and(body_partial_json(json!({ "token": "tok-pending" })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "success",
      "paymentStatus": "INIT_THREEDS"
    })))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/payment/retrieve"))
    .and(body_partial_json(json!({ "token": "tok-failed" })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "failure",
      "errorCode": "5006",
      "errorMessage": "Transaction not approved"
    })))
    .mount(&server)
    .await;

  let gateway = gateway_for(&server, Duration::from_secs(5));
  assert_eq!(
    gateway.retrieve_status("tok-paid").await.unwrap(),
    PaymentStatusOutcome::Paid {
      conversation_id: Some("conv-1".to_string()),
      paid_amount: Some(60000),
    }
  );
  assert_eq!(
    gateway.retrieve_status("tok-numeric").await.unwrap(),
    PaymentStatusOutcome::Paid {
      conversation_id: None,
      paid_amount: Some(1990),
    }
  );
  assert!(matches!(
    gateway.retrieve_status("tok-garbled").await,
    Err(GatewayError::Protocol(_))
  ));
  assert!(matches!(
    gateway.retrieve_status("tok-pending").await.unwrap(),
    PaymentStatusOutcome::NotPaid { .. }
  ));
  assert_eq!(
    gateway.retrieve_status("tok-failed").await.unwrap(),
    PaymentStatusOutcome::NotPaid {
      code: Some("5006".to_string()),
      message: "Transaction not approved".to_string(),
    }
  );
}

fn issuer_for(server: &MockServer, auth: InvoiceAuth) -> HttpInvoiceIssuer {
  HttpInvoiceIssuer::new(Some(InvoiceIssuerConfig {
    base_url: server.uri(),
    auth,
    timeout: Duration::from_secs(5),
  }))
  .expect("issuer client builds")
}

fn client_credentials() -> InvoiceAuth {
  InvoiceAuth::ClientCredentials {
    client_id: "client".to_string(),
    client_secret: "secret".to_string(),
  }
}

fn invoice_payload(external_id: &str) -> InvoicePayload {
  InvoicePayload {
    external_id: external_id.to_string(),
    document_type: "EARCHIVE".to_string(),
    issue_date: Utc::now(),
    currency: "TRY".to_string(),
    customer: InvoiceCustomer {
      name: "Ayse".to_string(),
      surname: "Yilmaz".to_string(),
      tax_number: "12345678901".to_string(),
      email: "ayse@example.com".to_string(),
      phone: "+905551112233".to_string(),
      address: "Bagdat Cad. 1".to_string(),
      city: "Istanbul".to_string(),
      zip_code: "34000".to_string(),
      country: "Turkey".to_string(),
    },
    lines: vec![InvoiceLine {
      name: "X".to_string(),
      quantity: 1,
      unit_price: "500.00".to_string(),
      tax_rate: 20,
      tax_amount: "100.00".to_string(),
      line_total: "500.00".to_string(),
    }],
    totals: InvoiceTotals {
      line_extension_amount: "500.00".to_string(),
      tax_total: "100.00".to_string(),
      payable_amount: "600.00".to_string(),
    },
  }
}

#[tokio::test]
async fn test_invoice_with_api_key() {
  setup_tracing();
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/invoices"))
    .and(header("X-Api-Key", "inv-key"))
    .and(body_partial_json(json!({
      "externalId": "ORD-1",
      "documentType": "EARCHIVE",
      "totals": { "payableAmount": "600.00" }
    })))
    .respond_with(ResponseTemplate::new(201).set_body_json(json!({
      "uuid": "3f1c0a9e",
      "pdfUrl": "https://issuer.test/3f1c0a9e.pdf"
    })))
    .expect(1)
    .mount(&server)
    .await;

  let issuer = issuer_for(&server, InvoiceAuth::ApiKey("inv-key".to_string()));
  assert!(issuer.is_configured());
  let receipt = issuer.create_invoice(&invoice_payload("ORD-1")).await.unwrap();
  assert_eq!(receipt.uuid, "3f1c0a9e");
  assert_eq!(receipt.pdf_url.as_deref(), Some("https://issuer.test/3f1c0a9e.pdf"));
}

#[tokio::test]
async fn test_oauth_token_is_fetched_once_and_reused() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/oauth/token"))
    .and(body_string_contains("grant_type=client_credentials"))
    .and(body_string_contains("client_id=client"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "access_token": "bearer-1",
      "expires_in": 3600
    })))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/invoices"))
    .and(header("authorization", "Bearer bearer-1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "u-1" })))
    .expect(2)
    .mount(&server)
    .await;

  let issuer = issuer_for(&server, client_credentials());
  let first = issuer.create_invoice(&invoice_payload("ORD-1")).await.unwrap();
  let second = issuer.create_invoice(&invoice_payload("ORD-2")).await.unwrap();
  assert_eq!(first.uuid, "u-1");
  assert_eq!(second.uuid, "u-1");
  assert!(first.pdf_url.is_none());
}

#[tokio::test]
async fn test_unauthorized_invalidates_cached_token() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/oauth/token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "bearer-1" })))
    .expect(2)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/invoices"))
    .respond_with(ResponseTemplate::new(401))
    .up_to_n_times(1)
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/invoices"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "u-2" })))
    .expect(1)
    .mount(&server)
    .await;

  let issuer = issuer_for(&server, client_credentials());
  let err = issuer.create_invoice(&invoice_payload("ORD-1")).await.unwrap_err();
  assert!(matches!(err, InvoiceError::Auth(_)));

  let receipt = issuer.create_invoice(&invoice_payload("ORD-1")).await.unwrap();
  assert_eq!(receipt.uuid, "u-2");
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_auth_error() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/oauth/token"))
    .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_client" })))
    .mount(&server)
    .await;

  let err = issuer_for(&server, client_credentials())
    .create_invoice(&invoice_payload("ORD-1"))
    .await
    .unwrap_err();
  assert!(matches!(err, InvoiceError::Auth(_)));
}

#[tokio::test]
async fn test_validation_failure_is_rejected_with_provider_message() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/invoices"))
    .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "message": "taxNumber is invalid" })))
    .mount(&server)
    .await;

  let err = issuer_for(&server, InvoiceAuth::ApiKey("k".to_string()))
    .create_invoice(&invoice_payload("ORD-1"))
    .await
    .unwrap_err();
  match err {
    InvoiceError::Rejected(message) => assert_eq!(message, "taxNumber is invalid"),
    other => panic!("expected rejection, got {:?}", other),
  }
}

#[tokio::test]
async fn test_issuer_outage_is_unavailable() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/invoices"))
    .respond_with(ResponseTemplate::new(503))
    .mount(&server)
    .await;

  let err = issuer_for(&server, InvoiceAuth::ApiKey("k".to_string()))
    .create_invoice(&invoice_payload("ORD-1"))
    .await
    .unwrap_err();
  assert!(matches!(err, InvoiceError::Unavailable(_)));
}

#[tokio::test]
async fn test_unconfigured_issuer_never_calls_out() {
  let issuer = HttpInvoiceIssuer::new(None).unwrap();
  assert!(!issuer.is_configured());
  let err = issuer.create_invoice(&invoice_payload("ORD-1")).await.unwrap_err();
  assert!(matches!(err, InvoiceError::NotConfigured));
}

#[tokio::test]
async fn test_token_cache_refreshes_once_under_contention() {
  let cache = Arc::new(TokenCache::new());
  let refreshes = Arc::new(AtomicUsize::new(0));
  let now = Utc::now();

  let mut handles = Vec::new();
  for _ in 0..8 {
    let cache = cache.clone();
    let refreshes = refreshes.clone();
    handles.push(tokio::spawn(async move {
      cache
        .get_or_refresh(now, || async move {
          refreshes.fetch_add(1, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(20)).await;
          Ok(("shared".to_string(), Duration::from_secs(3600)))
        })
        .await
    }));
  }
  for handle in handles {
    assert_eq!(handle.await.unwrap().unwrap(), "shared");
  }
  assert_eq!(refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_cache_refreshes_after_expiry_and_invalidate() {
  let cache = TokenCache::new();
  let now = Utc::now();

  let first = cache
    .get_or_refresh(now, || async { Ok(("a".to_string(), Duration::from_secs(60))) })
    .await
    .unwrap();
  assert_eq!(first, "a");

  // 60s ttl minus the 30s skew: still fresh at +20s, stale at +31s.
  let cached = cache
    .get_or_refresh(now + chrono::Duration::seconds(20), || async {
      Ok(("b".to_string(), Duration::from_secs(60)))
    })
    .await
    .unwrap();
  assert_eq!(cached, "a");
  let refreshed = cache
    .get_or_refresh(now + chrono::Duration::seconds(31), || async {
      Ok(("c".to_string(), Duration::from_secs(60)))
    })
    .await
    .unwrap();
  assert_eq!(refreshed, "c");

  cache.invalidate().await;
  let after_invalidate = cache
    .get_or_refresh(now + chrono::Duration::seconds(32), || async {
      Ok(("d".to_string(), Duration::from_secs(60)))
    })
    .await
    .unwrap();
  assert_eq!(after_invalidate, "d");
}
