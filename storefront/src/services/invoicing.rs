// storefront/src/services/invoicing.rs

//! Issues the invoice for a paid order at most once. Used by payment
//! confirmation, the admin retry endpoint and the background sweeper.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::errors::Result;
use crate::models::Order;
use crate::services::invoice_issuer::{
  InvoiceCustomer, InvoiceIssuer, InvoiceLine, InvoicePayload, InvoiceReceipt, InvoiceTotals,
};
use crate::services::order_store::OrderStore;
use crate::services::pricing::{format_minor, round_div};

/// A claim older than this is treated as abandoned by a crashed worker.
pub const INVOICE_CLAIM_LEASE: Duration = Duration::from_secs(300);

pub const SHIPPING_LINE_NAME: &str = "Shipping";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceAttempt {
  Issued(InvoiceReceipt),
  /// Issuer not configured.
  Disabled,
  /// Not paid, already invoiced, or currently claimed elsewhere.
  NotEligible,
  Failed(String),
}

/// Pre-tax price for a gross amount, rounded to the minor unit.
pub fn net_of_tax(gross: i64, tax_rate: i64) -> i64 {
  round_div(gross as i128 * 100, 100 + tax_rate as i128)
}

/// Tax contained in a gross amount: `gross × rate / (100 + rate)`.
pub fn tax_in_gross(gross: i64, tax_rate: i64) -> i64 {
  round_div(gross as i128 * tax_rate as i128, 100 + tax_rate as i128)
}

struct LineAmounts {
  name: String,
  quantity: i64,
  unit_price: i64,
  line_total: i64,
  tax_amount: i64,
}

fn line_amounts(name: &str, gross_unit_price: i64, quantity: i64, tax_rate: i64) -> LineAmounts {
  let unit_price = net_of_tax(gross_unit_price, tax_rate);
  let line_total = unit_price * quantity;
  LineAmounts {
    name: name.to_string(),
    quantity,
    unit_price,
    line_total,
    tax_amount: round_div(line_total as i128 * tax_rate as i128, 100),
  }
}

/// Per-line rounding drifts from the totals derived from the gross order total.
/// The drift is booked on the largest lines first, never taking a line below zero,
/// so the lines add up to the totals.
fn settle_rounding(lines: &mut [LineAmounts], line_extension: i64, tax_total: i64) {
  let mut net_drift = line_extension - lines.iter().map(|l| l.line_total).sum::<i64>();
  let mut tax_drift = tax_total - lines.iter().map(|l| l.tax_amount).sum::<i64>();

  let mut order: Vec<usize> = (0..lines.len()).collect();
  order.sort_by_key(|&i| std::cmp::Reverse(lines[i].line_total));
  for i in order {
    if net_drift == 0 && tax_drift == 0 {
      break;
    }
    let line = &mut lines[i];
    let net_step = net_drift.max(-line.line_total);
    line.line_total += net_step;
    net_drift -= net_step;
    let tax_step = tax_drift.max(-line.tax_amount);
    line.tax_amount += tax_step;
    tax_drift -= tax_step;
    if line.quantity == 1 {
      line.unit_price = line.line_total;
    }
  }
}

pub fn build_invoice_payload(order: &Order, tax_rate: i64, issue_date: DateTime<Utc>) -> InvoicePayload {
  let mut amounts: Vec<LineAmounts> = order
    .items
    .iter()
    .map(|item| line_amounts(&item.name, item.unit_price, item.quantity, tax_rate))
    .collect();
  if order.shipping_cost > 0 {
    amounts.push(line_amounts(SHIPPING_LINE_NAME, order.shipping_cost, 1, tax_rate));
  }

  let tax_total = tax_in_gross(order.total, tax_rate);
  let line_extension = order.total - tax_total;
  settle_rounding(&mut amounts, line_extension, tax_total);

  let lines = amounts
    .into_iter()
    .map(|l| InvoiceLine {
      name: l.name,
      quantity: l.quantity,
      unit_price: format_minor(l.unit_price),
      tax_rate,
      tax_amount: format_minor(l.tax_amount),
      line_total: format_minor(l.line_total),
    })
    .collect();

  InvoicePayload {
    external_id: order.order_number.clone(),
    document_type: "EARCHIVE".to_string(),
    issue_date,
    currency: order.currency.clone(),
    customer: InvoiceCustomer {
      name: order.buyer.name.clone(),
      surname: order.buyer.surname.clone(),
      tax_number: order.buyer.national_id.clone(),
      email: order.buyer.email.clone(),
      phone: order.buyer.phone.clone(),
      address: order.billing_address.line.clone(),
      city: order.billing_address.city.clone(),
      zip_code: order.billing_address.zip_code.clone(),
      country: order.billing_address.country.clone(),
    },
    lines,
    totals: InvoiceTotals {
      line_extension_amount: format_minor(line_extension),
      tax_total: format_minor(tax_total),
      payable_amount: format_minor(order.total),
    },
  }
}

#[instrument(name = "invoicing::issue_for_order", skip(orders, issuer))]
pub async fn issue_for_order(
  orders: &dyn OrderStore,
  issuer: &dyn InvoiceIssuer,
  tax_rate: i64,
  order_number: &str,
) -> Result<InvoiceAttempt> {
  if !issuer.is_configured() {
    return Ok(InvoiceAttempt::Disabled);
  }

  let Some(order) = orders.claim_for_invoicing(order_number, INVOICE_CLAIM_LEASE).await? else {
    info!("Order is not eligible for invoicing.");
    return Ok(InvoiceAttempt::NotEligible);
  };

  let payload = build_invoice_payload(&order, tax_rate, Utc::now());
  match issuer.create_invoice(&payload).await {
    Ok(receipt) => {
      if !orders.attach_invoice(order.id, &receipt).await? {
        warn!(invoice_uuid = %receipt.uuid, "Invoice issued but order already carried one.");
      }
      info!(invoice_uuid = %receipt.uuid, "Invoice attached to order.");
      Ok(InvoiceAttempt::Issued(receipt))
    }
    Err(e) => {
      warn!(error = %e, "Invoice issuance failed; order stays paid and uninvoiced.");
      orders.release_invoice_claim(order.id).await?;
      Ok(InvoiceAttempt::Failed(e.to_string()))
    }
  }
}
