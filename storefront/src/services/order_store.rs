// storefront/src/services/order_store.rs

//! Order persistence. Every state change is a single guarded statement so that
//! concurrent confirmations cannot double-apply it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{NewOrder, Order, OrderListQuery, OrderPage, OrderStatus, TransitionOutcome};
use crate::services::invoice_issuer::InvoiceReceipt;

/// A confirmed payment as the gateway reported it. It may only settle the order
/// it was started for: the reference must be the order's stored payment token,
/// or the gateway's conversation id must be the order's, and a reported amount
/// must equal the order total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMatch {
  pub reference: String,
  pub conversation_id: Option<String>,
  pub paid_amount: Option<i64>,
}

impl PaymentMatch {
  pub fn new(reference: impl Into<String>) -> Self {
    Self {
      reference: reference.into(),
      conversation_id: None,
      paid_amount: None,
    }
  }

  pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
    self.conversation_id = conversation_id;
    self
  }

  pub fn with_paid_amount(mut self, paid_amount: Option<i64>) -> Self {
    self.paid_amount = paid_amount;
    self
  }

  pub fn matches(&self, order: &Order) -> bool {
    let bound = order.payment_token.as_deref() == Some(self.reference.as_str())
      || self.conversation_id.as_deref() == Some(order.conversation_id.as_str());
    bound && self.paid_amount.map_or(true, |amount| amount == order.total)
  }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Inserts the order as `pending`/`pending`.
  async fn insert_pending(&self, order: &NewOrder) -> Result<Order>;

  /// Stores the gateway reference, only if none is stored yet.
  async fn set_payment_token(&self, order_id: Uuid, token: &str) -> Result<bool>;

  /// Marks the order paid if its payment is still pending and `payment` matches
  /// it. `order_number`, when given, narrows the match. Returns whether a row changed.
  async fn mark_paid(&self, order_number: Option<&str>, payment: &PaymentMatch) -> Result<bool>;

  async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>>;

  /// Looks an order up by payment token or conversation id.
  async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>>;

  /// Takes the invoicing lease on a paid, uninvoiced order. A lease older than
  /// `lease` is considered abandoned.
  async fn claim_for_invoicing(&self, order_number: &str, lease: Duration) -> Result<Option<Order>>;

  /// Records the invoice, only if none is recorded yet. Clears the lease.
  async fn attach_invoice(&self, order_id: Uuid, receipt: &InvoiceReceipt) -> Result<bool>;

  async fn release_invoice_claim(&self, order_id: Uuid) -> Result<()>;

  async fn transition_status(&self, order_number: &str, next: OrderStatus) -> Result<TransitionOutcome>;

  async fn list(&self, query: &OrderListQuery) -> Result<OrderPage>;

  /// Paid orders without an invoice, oldest first.
  async fn list_uninvoiced(&self, limit: i64) -> Result<Vec<Order>>;
}

pub fn generate_order_number(now: DateTime<Utc>) -> String {
  let suffix = Uuid::new_v4().simple().to_string();
  format!("ORD-{}-{}", now.format("%Y%m%d"), suffix[..10].to_ascii_uppercase())
}

pub fn generate_conversation_id() -> String {
  Uuid::new_v4().to_string()
}

pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  #[instrument(skip(self, order), fields(order_number = %order.order_number))]
  async fn insert_pending(&self, order: &NewOrder) -> Result<Order> {
    let inserted = sqlx::query_as::<_, Order>(
      r#"
      INSERT INTO orders (
        id, order_number, user_id, buyer, shipping_address, billing_address, items,
        subtotal, shipping_cost, total, currency, status, payment_method, payment_status, conversation_id
      )
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending', 'card', 'pending', $12)
      RETURNING *
      "#,
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.user_id)
    .bind(Json(&order.buyer))
    .bind(Json(&order.shipping_address))
    .bind(Json(&order.billing_address))
    .bind(Json(&order.items))
    .bind(order.subtotal)
    .bind(order.shipping_cost)
    .bind(order.total)
    .bind(&order.currency)
    .bind(&order.conversation_id)
    .fetch_one(&self.pool)
    .await?;
    Ok(inserted)
  }

  async fn set_payment_token(&self, order_id: Uuid, token: &str) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE orders SET payment_token = $2, updated_at = now() WHERE id = $1 AND payment_token IS NULL",
    )
    .bind(order_id)
    .bind(token)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  #[instrument(skip(self, payment))]
  async fn mark_paid(&self, order_number: Option<&str>, payment: &PaymentMatch) -> Result<bool> {
    let result = sqlx::query(
      r#"
      UPDATE orders SET status = 'paid', payment_status = 'paid', updated_at = now()
      WHERE ($1::text IS NULL OR order_number = $1)
        AND (payment_token = $2 OR conversation_id = $3)
        AND ($4::bigint IS NULL OR total = $4)
        AND status = 'pending' AND payment_status = 'pending'
      "#,
    )
    .bind(order_number)
    .bind(&payment.reference)
    .bind(payment.conversation_id.as_deref())
    .bind(payment.paid_amount)
    .execute(&self.pool)
    .await?;
    debug!(rows = result.rows_affected(), "mark_paid applied");
    Ok(result.rows_affected() > 0)
  }

  async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
      .bind(order_number)
      .fetch_optional(&self.pool)
      .await?;
    Ok(order)
  }

  async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
      "SELECT * FROM orders WHERE payment_token = $1 OR conversation_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(reference)
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }

  #[instrument(skip(self))]
  async fn claim_for_invoicing(&self, order_number: &str, lease: Duration) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
      r#"
      UPDATE orders SET invoice_claimed_at = now()
      WHERE order_number = $1
        AND status = 'paid'
        AND invoice_uuid IS NULL
        AND (invoice_claimed_at IS NULL OR invoice_claimed_at < now() - make_interval(secs => $2))
      RETURNING *
      "#,
    )
    .bind(order_number)
    .bind(lease.as_secs_f64())
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }

  #[instrument(skip(self, receipt), fields(invoice_uuid = %receipt.uuid))]
  async fn attach_invoice(&self, order_id: Uuid, receipt: &InvoiceReceipt) -> Result<bool> {
    let result = sqlx::query(
      r#"
      UPDATE orders
      SET invoice_uuid = $2, invoice_pdf_url = $3, invoiced_at = now(), invoice_claimed_at = NULL, updated_at = now()
      WHERE id = $1 AND invoice_uuid IS NULL
      "#,
    )
    .bind(order_id)
    .bind(&receipt.uuid)
    .bind(&receipt.pdf_url)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn release_invoice_claim(&self, order_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE orders SET invoice_claimed_at = NULL WHERE id = $1 AND invoice_uuid IS NULL")
      .bind(order_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  async fn transition_status(&self, order_number: &str, next: OrderStatus) -> Result<TransitionOutcome> {
    let allowed_from: Vec<String> = next
      .allowed_predecessors()
      .iter()
      .map(|s| s.as_str().to_string())
      .collect();

    let updated = sqlx::query_as::<_, Order>(
      r#"
      UPDATE orders
      SET status = $2,
          payment_status = CASE WHEN $2 = 'paid'::order_status_enum THEN 'paid'::payment_status_enum ELSE payment_status END,
          updated_at = now()
      WHERE order_number = $1 AND status::text = ANY($3)
      RETURNING *
      "#,
    )
    .bind(order_number)
    .bind(next)
    .bind(&allowed_from)
    .fetch_optional(&self.pool)
    .await?;

    if let Some(order) = updated {
      return Ok(TransitionOutcome::Applied(order));
    }
    Ok(match self.find_by_number(order_number).await? {
      Some(order) => TransitionOutcome::NotAllowed { current: order.status },
      None => TransitionOutcome::NotFound,
    })
  }

  async fn list(&self, query: &OrderListQuery) -> Result<OrderPage> {
    let per_page = query.per_page.clamp(1, 100);
    let offset = query
      .offset()
      .ok_or_else(|| AppError::Validation("page is out of range".to_string()))?;

    let orders = sqlx::query_as::<_, Order>(
      r#"
      SELECT * FROM orders
      WHERE ($1::order_status_enum IS NULL OR status = $1)
      ORDER BY created_at DESC
      LIMIT $2 OFFSET $3
      "#,
    )
    .bind(query.status)
    .bind(per_page)
    .bind(offset)
    .fetch_all(&self.pool)
    .await?;

    let total: i64 =
      sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE ($1::order_status_enum IS NULL OR status = $1)")
        .bind(query.status)
        .fetch_one(&self.pool)
        .await?;

    Ok(OrderPage { orders, total })
  }

  async fn list_uninvoiced(&self, limit: i64) -> Result<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>(
      r#"
      SELECT * FROM orders
      WHERE status = 'paid' AND invoice_uuid IS NULL
      ORDER BY updated_at ASC
      LIMIT $1
      "#,
    )
    .bind(limit)
    .fetch_all(&self.pool)
    .await?;
    Ok(orders)
  }
}
