// storefront/src/services/memory_order_store.rs

//! In-process `OrderStore` with the same guarded semantics as the Postgres one.
//! Each operation runs under one lock acquisition.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{NewOrder, Order, OrderListQuery, OrderPage, OrderStatus, PaymentStatus, TransitionOutcome};
use crate::services::invoice_issuer::InvoiceReceipt;
use crate::services::order_store::{OrderStore, PaymentMatch};

#[derive(Default)]
pub struct MemoryOrderStore {
  orders: Mutex<Vec<Order>>,
}

impl MemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.orders.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.orders.lock().is_empty()
  }

  pub fn snapshot(&self) -> Vec<Order> {
    self.orders.lock().clone()
  }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
  async fn insert_pending(&self, new: &NewOrder) -> Result<Order> {
    let mut orders = self.orders.lock();
    if orders
      .iter()
      .any(|o| o.id == new.id || o.order_number == new.order_number || o.conversation_id == new.conversation_id)
    {
      return Err(AppError::Conflict(format!("Order {} already exists", new.order_number)));
    }
    let now = Utc::now();
    let order = Order {
      id: new.id,
      order_number: new.order_number.clone(),
      user_id: new.user_id,
      buyer: new.buyer.clone(),
      shipping_address: new.shipping_address.clone(),
      billing_address: new.billing_address.clone(),
      items: new.items.clone(),
      subtotal: new.subtotal,
      shipping_cost: new.shipping_cost,
      total: new.total,
      currency: new.currency.clone(),
      status: OrderStatus::Pending,
      payment_method: "card".to_string(),
      payment_status: PaymentStatus::Pending,
      payment_token: None,
      conversation_id: new.conversation_id.clone(),
      invoice_uuid: None,
      invoice_pdf_url: None,
      invoiced_at: None,
      invoice_claimed_at: None,
      created_at: now,
      updated_at: now,
    };
    orders.push(order.clone());
    Ok(order)
  }

  async fn set_payment_token(&self, order_id: Uuid, token: &str) -> Result<bool> {
    let mut orders = self.orders.lock();
    match orders.iter_mut().find(|o| o.id == order_id && o.payment_token.is_none()) {
      Some(order) => {
        order.payment_token = Some(token.to_string());
        order.updated_at = Utc::now();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn mark_paid(&self, order_number: Option<&str>, payment: &PaymentMatch) -> Result<bool> {
    let mut orders = self.orders.lock();
    let target = orders.iter_mut().find(|o| {
      order_number.map_or(true, |number| o.order_number == number)
        && payment.matches(o)
        && o.status == OrderStatus::Pending
        && o.payment_status == PaymentStatus::Pending
    });
    match target {
      Some(order) => {
        order.status = OrderStatus::Paid;
        order.payment_status = PaymentStatus::Paid;
        order.updated_at = Utc::now();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>> {
    Ok(self.orders.lock().iter().find(|o| o.order_number == order_number).cloned())
  }

  async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
    Ok(
      self
        .orders
        .lock()
        .iter()
        .rev()
        .find(|o| o.payment_token.as_deref() == Some(reference) || o.conversation_id == reference)
        .cloned(),
    )
  }

  async fn claim_for_invoicing(&self, order_number: &str, lease: Duration) -> Result<Option<Order>> {
    let mut orders = self.orders.lock();
    let now = Utc::now();
    let lease = chrono::Duration::from_std(lease).map_err(|e| AppError::Internal(e.to_string()))?;
    let claimable = orders.iter_mut().find(|o| {
      o.order_number == order_number
        && o.is_invoiceable()
        && o.invoice_claimed_at.map_or(true, |claimed| claimed < now - lease)
    });
    Ok(claimable.map(|order| {
      order.invoice_claimed_at = Some(now);
      order.clone()
    }))
  }

  async fn attach_invoice(&self, order_id: Uuid, receipt: &InvoiceReceipt) -> Result<bool> {
    let mut orders = self.orders.lock();
    match orders.iter_mut().find(|o| o.id == order_id && o.invoice_uuid.is_none()) {
      Some(order) => {
        let now = Utc::now();
        order.invoice_uuid = Some(receipt.uuid.clone());
        order.invoice_pdf_url = receipt.pdf_url.clone();
        order.invoiced_at = Some(now);
        order.invoice_claimed_at = None;
        order.updated_at = now;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn release_invoice_claim(&self, order_id: Uuid) -> Result<()> {
    let mut orders = self.orders.lock();
    if let Some(order) = orders.iter_mut().find(|o| o.id == order_id && o.invoice_uuid.is_none()) {
      order.invoice_claimed_at = None;
    }
    Ok(())
  }

  async fn transition_status(&self, order_number: &str, next: OrderStatus) -> Result<TransitionOutcome> {
    let mut orders = self.orders.lock();
    let Some(order) = orders.iter_mut().find(|o| o.order_number == order_number) else {
      return Ok(TransitionOutcome::NotFound);
    };
    if !order.status.can_transition_to(next) {
      return Ok(TransitionOutcome::NotAllowed { current: order.status });
    }
    order.status = next;
    if next == OrderStatus::Paid {
      order.payment_status = PaymentStatus::Paid;
    }
    order.updated_at = Utc::now();
    Ok(TransitionOutcome::Applied(order.clone()))
  }

  async fn list(&self, query: &OrderListQuery) -> Result<OrderPage> {
    let per_page = query.per_page.clamp(1, 100) as usize;
    let offset = query
      .offset()
      .and_then(|offset| usize::try_from(offset).ok())
      .ok_or_else(|| AppError::Validation("page is out of range".to_string()))?;

    let mut matching: Vec<Order> = self
      .orders
      .lock()
      .iter()
      .filter(|o| query.status.map_or(true, |s| o.status == s))
      .cloned()
      .collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = matching.len() as i64;
    let orders = matching.into_iter().skip(offset).take(per_page).collect();
    Ok(OrderPage { orders, total })
  }

  async fn list_uninvoiced(&self, limit: i64) -> Result<Vec<Order>> {
    let mut pending: Vec<Order> = self
      .orders
      .lock()
      .iter()
      .filter(|o| o.is_invoiceable())
      .cloned()
      .collect();
    pending.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    pending.truncate(limit.max(0) as usize);
    Ok(pending)
  }
}
