// storefront/src/pipelines/checkout_pipeline.rs
use crate::errors::AppError;
use crate::models::{Address, BuyerSnapshot, CheckoutRequest, LineItem, NewOrder};
use crate::pipelines::contexts::{CheckoutCtxData, CheckoutOutcome};
use crate::services::order_store::{generate_conversation_id, generate_order_number};
use crate::services::payment_gateway::{
  BasketItem, ChargeOutcome, ChargeRequest, GatewayAddress, GatewayBuyer, PaymentCard,
};
use crate::services::pricing::{format_minor, price_lines, OrderTotals};
use crate::services::validation::validate_checkout_request;
use crate::state::AppState;
use chrono::Utc;
use std::sync::Arc;
use stepflow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const TEST_TOKEN_PREFIX: &str = "test-token-";
const DEFAULT_COUNTRY: &str = "Turkey";

pub fn register_checkout_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  let live_only: SkipCondition<CheckoutCtxData> =
    Arc::new(|ctx_data: ContextData<CheckoutCtxData>| ctx_data.read().app_state.is_test_mode());
  let test_only: SkipCondition<CheckoutCtxData> =
    Arc::new(|ctx_data: ContextData<CheckoutCtxData>| !ctx_data.read().app_state.is_test_mode());

  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("validate_checkout_request", false, None),
    ("price_cart", false, None),
    ("assign_order_references", false, None),
    ("persist_pending_order", false, None),
    ("build_charge_request", false, Some(live_only.clone())),
    ("submit_charge", false, Some(live_only)),
    ("synthesize_test_charge", false, Some(test_only)),
    ("record_payment_reference", false, None),
  ]);

  // Step 1: reject bad input before anything is written or sent.
  p.on_root("validate_checkout_request", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      validate_checkout_request(&guard.request)?;
      guard.line_items = guard
        .request
        .items
        .iter()
        .map(|line| LineItem {
          product_id: line.id.clone(),
          name: line.name.clone(),
          category: line.category.clone(),
          unit_price: line.price,
          quantity: line.quantity,
        })
        .collect();
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 2: subtotal, shipping and total in minor units.
  p.on_root("price_cart", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let totals = price_lines(&guard.line_items, &guard.app_state.config.pricing)?;
      info!(
        subtotal = totals.subtotal,
        shipping_cost = totals.shipping_cost,
        total = totals.total,
        "Cart priced."
      );
      guard.totals = Some(totals);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 3
  p.on_root("assign_order_references", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      guard.order_id = Some(Uuid::new_v4());
      guard.order_number = Some(generate_order_number(Utc::now()));
      guard.conversation_id = Some(generate_conversation_id());
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 4: the order exists as pending/pending before the gateway is contacted.
  p.on_root("persist_pending_order", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (new_order, orders) = {
        let guard = ctx_data.read();
        (build_new_order(&guard)?, guard.app_state.orders.clone())
      };
      let order = orders.insert_pending(&new_order).await?;
      info!(order_number = %order.order_number, total = order.total, "Pending order persisted.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 5
  p.on_root("build_charge_request", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let charge_request = build_charge_request(&guard)?;
      guard.charge_request = Some(charge_request);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 6: a decline stops the run and leaves the order pending for another attempt.
  p.on_root("submit_charge", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (gateway, charge_request, order_number) = {
        let guard = ctx_data.read();
        (
          guard.app_state.payment_gateway.clone(),
          guard.charge_request.clone(),
          guard.order_number.clone().unwrap_or_default(),
        )
      };
      let gateway =
        gateway.ok_or_else(|| AppError::Internal("submit_charge ran without a payment gateway".to_string()))?;
      let charge_request =
        charge_request.ok_or_else(|| AppError::Internal("Charge request was not built".to_string()))?;

      let outcome = match gateway.submit_charge(&charge_request).await {
        Ok(outcome) => outcome,
        Err(e) => {
          error!(%order_number, error = %e, retryable = e.is_retryable(), "Charge submission failed.");
          return Err(AppError::from(e));
        }
      };

      let (outcome, control) = match outcome {
        ChargeOutcome::Redirect { token, payment_page_url } => (
          CheckoutOutcome::Redirect { token, payment_page_url },
          PipelineControl::Continue,
        ),
        ChargeOutcome::Challenge {
          html_content,
          conversation_id,
        } => (
          CheckoutOutcome::Challenge {
            html_content,
            conversation_id,
          },
          PipelineControl::Continue,
        ),
        ChargeOutcome::Declined { code, message } => {
          warn!(%order_number, decline_code = ?code, "Charge declined; order left pending.");
          (CheckoutOutcome::Declined { code, message }, PipelineControl::Stop)
        }
      };
      ctx_data.write().outcome = Some(outcome);
      Ok::<_, AppError>(control)
    })
  });

  // Step 7: without gateway credentials the charge is simulated.
  p.on_root("synthesize_test_charge", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let order_number = guard.order_number.clone().unwrap_or_default();
      let token = format!("{}{}", TEST_TOKEN_PREFIX, Uuid::new_v4());
      let payment_page_url = format!(
        "{}/payment/status?token={}&orderNumber={}",
        guard.app_state.config.app_base_url.trim_end_matches('/'),
        token,
        order_number
      );
      info!(%order_number, "Test mode: synthesized payment token.");
      guard.outcome = Some(CheckoutOutcome::Redirect { token, payment_page_url });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 8: remember which reference the confirmation will arrive with.
  p.on_root("record_payment_reference", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (orders, order_id, reference) = {
        let guard = ctx_data.read();
        let reference = match &guard.outcome {
          Some(CheckoutOutcome::Redirect { token, .. }) => token.clone(),
          Some(CheckoutOutcome::Challenge { conversation_id, .. }) => conversation_id.clone(),
          Some(CheckoutOutcome::Declined { .. }) | None => {
            return Err(AppError::Internal("No payment reference to record".to_string()));
          }
        };
        let order_id = guard
          .order_id
          .ok_or_else(|| AppError::Internal("Order id was not assigned".to_string()))?;
        (guard.app_state.orders.clone(), order_id, reference)
      };
      if !orders.set_payment_token(order_id, &reference).await? {
        warn!(%order_id, "Order already carried a payment reference.");
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  info!("Checkout pipeline registered.");
}

fn buyer_address(request: &CheckoutRequest) -> Address {
  let customer = &request.customer_info;
  Address {
    line: customer.address.trim().to_string(),
    city: customer.city.trim().to_string(),
    zip_code: customer.zip_code.trim().to_string(),
    country: DEFAULT_COUNTRY.to_string(),
  }
}

fn required_refs(ctx: &CheckoutCtxData) -> Result<(Uuid, String, String, OrderTotals), AppError> {
  match (&ctx.order_id, &ctx.order_number, &ctx.conversation_id, &ctx.totals) {
    (Some(id), Some(number), Some(conversation), Some(totals)) => {
      Ok((*id, number.clone(), conversation.clone(), *totals))
    }
    _ => Err(AppError::Internal("Order references or totals missing".to_string())),
  }
}

fn build_new_order(ctx: &CheckoutCtxData) -> Result<NewOrder, AppError> {
  let (id, order_number, conversation_id, totals) = required_refs(ctx)?;
  let customer = &ctx.request.customer_info;
  let address = buyer_address(&ctx.request);
  Ok(NewOrder {
    id,
    order_number,
    user_id: ctx.request.user_id,
    buyer: BuyerSnapshot {
      name: customer.name.trim().to_string(),
      surname: customer.surname.trim().to_string(),
      email: customer.email.trim().to_string(),
      phone: customer.phone.trim().to_string(),
      national_id: customer.tc.trim().to_string(),
    },
    shipping_address: address.clone(),
    billing_address: address,
    items: ctx.line_items.clone(),
    subtotal: totals.subtotal,
    shipping_cost: totals.shipping_cost,
    total: totals.total,
    currency: ctx.app_state.config.pricing.currency.clone(),
    conversation_id,
  })
}

/// Fails if the basket lines do not add up to the order total.
pub fn build_charge_request(ctx: &CheckoutCtxData) -> Result<ChargeRequest, AppError> {
  let (_, order_number, conversation_id, totals) = required_refs(ctx)?;
  let payment_config = ctx
    .app_state
    .config
    .payment
    .as_ref()
    .ok_or_else(|| AppError::Internal("Payment gateway is not configured".to_string()))?;
  let customer = &ctx.request.customer_info;
  let contact_name = format!("{} {}", customer.name.trim(), customer.surname.trim());
  let address = buyer_address(&ctx.request);

  let mut basket: Vec<(BasketItem, i64)> = ctx
    .line_items
    .iter()
    .map(|item| {
      let amount = item.line_total();
      (
        BasketItem {
          id: item.product_id.clone(),
          name: item.name.clone(),
          category1: item.category.clone().unwrap_or_else(|| "Cosmetics".to_string()),
          item_type: "PHYSICAL".to_string(),
          price: format_minor(amount),
        },
        amount,
      )
    })
    .collect();
  if totals.shipping_cost > 0 {
    basket.push((
      BasketItem {
        id: "shipping".to_string(),
        name: "Shipping".to_string(),
        category1: "Shipping".to_string(),
        item_type: "PHYSICAL".to_string(),
        price: format_minor(totals.shipping_cost),
      },
      totals.shipping_cost,
    ));
  }

  let basket_sum: i64 = basket.iter().map(|(_, amount)| amount).sum();
  if basket_sum != totals.total {
    error!(%order_number, basket_sum, total = totals.total, "Basket does not match order total.");
    return Err(AppError::Internal("Basket total does not match order total".to_string()));
  }

  let gateway_address = GatewayAddress {
    contact_name: contact_name.clone(),
    address: address.line.clone(),
    city: address.city.clone(),
    country: address.country.clone(),
    zip_code: address.zip_code.clone(),
  };

  Ok(ChargeRequest {
    locale: "tr".to_string(),
    conversation_id,
    basket_id: order_number.clone(),
    price: format_minor(totals.total),
    paid_price: format_minor(totals.total),
    currency: ctx.app_state.config.pricing.currency.clone(),
    installment: 1,
    payment_channel: "WEB".to_string(),
    payment_group: "PRODUCT".to_string(),
    callback_url: payment_config.callback_url.clone(),
    payment_card: PaymentCard {
      card_holder_name: customer
        .card_holder_name
        .clone()
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| contact_name.clone()),
      card_number: customer.card_number.chars().filter(|c| c.is_ascii_digit()).collect(),
      expire_month: customer.expire_month.trim().to_string(),
      expire_year: customer.expire_year.trim().to_string(),
      cvc: customer.cvc.trim().to_string(),
    },
    buyer: GatewayBuyer {
      id: ctx
        .request
        .user_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("guest-{}", order_number)),
      name: customer.name.trim().to_string(),
      surname: customer.surname.trim().to_string(),
      email: customer.email.trim().to_string(),
      gsm_number: customer.phone.trim().to_string(),
      identity_number: customer.tc.trim().to_string(),
      registration_address: address.line.clone(),
      city: address.city.clone(),
      country: address.country.clone(),
      zip_code: address.zip_code.clone(),
      ip: ctx.client_ip.clone(),
    },
    shipping_address: gateway_address.clone(),
    billing_address: gateway_address,
    basket_items: basket.into_iter().map(|(item, _)| item).collect(),
  })
}
