// storefront/src/services/invoice_sweeper.rs

//! Periodic retry of invoicing for paid orders that have none.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::errors::Result;
use crate::services::invoicing::{issue_for_order, InvoiceAttempt};
use crate::state::AppState;

const SWEEP_BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
  pub attempted: usize,
  pub issued: usize,
  pub failed: usize,
}

#[instrument(name = "invoicing::sweep_once", skip(app_state))]
pub async fn sweep_once(app_state: &AppState) -> Result<SweepReport> {
  let mut report = SweepReport::default();
  if !app_state.invoice_issuer.is_configured() {
    return Ok(report);
  }

  let candidates = app_state.orders.list_uninvoiced(SWEEP_BATCH_SIZE).await?;
  for order in candidates {
    report.attempted += 1;
    let attempt = issue_for_order(
      app_state.orders.as_ref(),
      app_state.invoice_issuer.as_ref(),
      app_state.config.invoice_tax_rate,
      &order.order_number,
    )
    .await?;
    match attempt {
      InvoiceAttempt::Issued(_) => report.issued += 1,
      InvoiceAttempt::Failed(_) => report.failed += 1,
      InvoiceAttempt::Disabled | InvoiceAttempt::NotEligible => {}
    }
  }
  if report.attempted > 0 {
    info!(attempted = report.attempted, issued = report.issued, failed = report.failed, "Invoice sweep finished.");
  }
  Ok(report)
}

/// Returns `None` when the interval is zero.
pub fn spawn_invoice_sweeper(app_state: AppState, interval_secs: u64) -> Option<JoinHandle<()>> {
  if interval_secs == 0 {
    return None;
  }
  info!(interval_secs, "Starting invoice sweeper.");
  Some(tokio::spawn(async move {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if let Err(e) = sweep_once(&app_state).await {
        error!(error = %e, "Invoice sweep failed.");
      }
    }
  }))
}
