// storefront/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Paid,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Paid => "paid",
      OrderStatus::Shipped => "shipped",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  /// States from which a move to `self` is allowed.
  pub fn allowed_predecessors(&self) -> &'static [OrderStatus] {
    match self {
      OrderStatus::Pending => &[],
      OrderStatus::Paid => &[OrderStatus::Pending],
      OrderStatus::Shipped => &[OrderStatus::Paid],
      OrderStatus::Delivered => &[OrderStatus::Shipped],
      OrderStatus::Cancelled => &[OrderStatus::Pending, OrderStatus::Paid],
    }
  }

  pub fn can_transition_to(&self, next: OrderStatus) -> bool {
    next.allowed_predecessors().contains(self)
  }
}

impl std::fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for OrderStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "pending" => Ok(OrderStatus::Pending),
      "paid" => Ok(OrderStatus::Paid),
      "shipped" => Ok(OrderStatus::Shipped),
      "delivered" => Ok(OrderStatus::Delivered),
      "cancelled" => Ok(OrderStatus::Cancelled),
      other => Err(format!("Unknown order status '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Pending,
  Paid,
}

/// Immutable snapshot of a cart line at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
  pub product_id: String,
  pub name: String,
  pub category: Option<String>,
  /// Gross unit price in minor units.
  pub unit_price: i64,
  pub quantity: i64,
}

impl LineItem {
  pub fn line_total(&self) -> i64 {
    self.unit_price * self.quantity
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
  pub line: String,
  pub city: String,
  pub zip_code: String,
  pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerSnapshot {
  pub name: String,
  pub surname: String,
  pub email: String,
  pub phone: String,
  pub national_id: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub user_id: Option<Uuid>,
  #[sqlx(json)]
  pub buyer: BuyerSnapshot,
  #[sqlx(json)]
  pub shipping_address: Address,
  #[sqlx(json)]
  pub billing_address: Address,
  #[sqlx(json)]
  pub items: Vec<LineItem>,
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub total: i64,
  pub currency: String,
  pub status: OrderStatus,
  pub payment_method: String,
  pub payment_status: PaymentStatus,
  pub payment_token: Option<String>,
  pub conversation_id: String,
  pub invoice_uuid: Option<String>,
  pub invoice_pdf_url: Option<String>,
  pub invoiced_at: Option<DateTime<Utc>>,
  pub invoice_claimed_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  pub fn is_invoiceable(&self) -> bool {
    self.status == OrderStatus::Paid && self.invoice_uuid.is_none()
  }
}

/// Everything needed to insert a pending order.
#[derive(Debug, Clone)]
pub struct NewOrder {
  pub id: Uuid,
  pub order_number: String,
  pub user_id: Option<Uuid>,
  pub buyer: BuyerSnapshot,
  pub shipping_address: Address,
  pub billing_address: Address,
  pub items: Vec<LineItem>,
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub total: i64,
  pub currency: String,
  pub conversation_id: String,
}

/// Outcome of a guarded status change.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
  Applied(Order),
  NotAllowed { current: OrderStatus },
  NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct OrderListQuery {
  pub status: Option<OrderStatus>,
  pub page: i64,
  pub per_page: i64,
}

impl OrderListQuery {
  /// Rows to skip for the requested page, `None` when it does not fit in an `i64`.
  pub fn offset(&self) -> Option<i64> {
    (self.page.max(1) - 1).checked_mul(self.per_page.clamp(1, 100))
  }
}

#[derive(Debug, Clone)]
pub struct OrderPage {
  pub orders: Vec<Order>,
  pub total: i64,
}

/// Public view of an order. No national id or payment reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
  pub order_number: String,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub items: Vec<LineItem>,
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub total: i64,
  pub currency: String,
  pub buyer_name: String,
  pub shipping_address: Address,
  pub invoice_uuid: Option<String>,
  pub invoice_pdf_url: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
  fn from(order: &Order) -> Self {
    Self {
      order_number: order.order_number.clone(),
      status: order.status,
      payment_status: order.payment_status,
      items: order.items.clone(),
      subtotal: order.subtotal,
      shipping_cost: order.shipping_cost,
      total: order.total,
      currency: order.currency.clone(),
      buyer_name: format!("{} {}", order.buyer.name, order.buyer.surname),
      shipping_address: order.shipping_address.clone(),
      invoice_uuid: order.invoice_uuid.clone(),
      invoice_pdf_url: order.invoice_pdf_url.clone(),
      created_at: order.created_at,
    }
  }
}
