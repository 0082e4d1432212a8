// storefront/src/services/pricing.rs

//! Integer minor-unit money arithmetic. Decimal strings are produced only for
//! provider payloads.

use crate::config::PricingConfig;
use crate::errors::{AppError, Result};
use crate::models::LineItem;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub total: i64,
}

/// Free shipping starts at the threshold, inclusive.
pub fn shipping_for(subtotal: i64, pricing: &PricingConfig) -> i64 {
  if subtotal >= pricing.free_shipping_threshold {
    0
  } else {
    pricing.flat_shipping_fee
  }
}

pub fn price_lines(items: &[LineItem], pricing: &PricingConfig) -> Result<OrderTotals> {
  let subtotal = items.iter().try_fold(0i64, |acc, item| {
    item
      .unit_price
      .checked_mul(item.quantity)
      .and_then(|line| acc.checked_add(line))
      .ok_or_else(|| AppError::Validation("Order amount is too large".to_string()))
  })?;
  let shipping_cost = shipping_for(subtotal, pricing);
  let total = subtotal
    .checked_add(shipping_cost)
    .ok_or_else(|| AppError::Validation("Order amount is too large".to_string()))?;
  Ok(OrderTotals {
    subtotal,
    shipping_cost,
    total,
  })
}

/// `numerator / denominator` rounded half away from zero.
pub fn round_div(numerator: i128, denominator: i128) -> i64 {
  let (n, d) = if denominator < 0 {
    (-numerator, -denominator)
  } else {
    (numerator, denominator)
  };
  let q = if n >= 0 { (2 * n + d) / (2 * d) } else { -((-2 * n + d) / (2 * d)) };
  q as i64
}

/// `60000` -> `"600.00"`.
pub fn format_minor(amount: i64) -> String {
  let sign = if amount < 0 { "-" } else { "" };
  let abs = amount.unsigned_abs();
  format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}


/// `"600.00"` / `"600.5"` / `"600"` -> minor units. At most two fraction digits, no sign.
pub fn parse_minor(amount: &str) -> Option<i64> {
  let amount = amount.trim();
  let (units, fraction) = amount.split_once('.').unwrap_or((amount, ""));
  if units.is_empty() || fraction.len() > 2 {
    return None;
  }
  if !units.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
    return None;
  }
  let units: i64 = units.parse().ok()?;
  let cents: i64 = if fraction.is_empty() {
    0
  } else {
    fraction.parse::<i64>().ok()? * if fraction.len() == 1 { 10 } else { 1 }
  };
  units.checked_mul(100)?.checked_add(cents)
}
