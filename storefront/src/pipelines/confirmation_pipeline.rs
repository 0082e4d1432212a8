// storefront/src/pipelines/confirmation_pipeline.rs
use crate::errors::AppError;
use crate::models::PaymentStatus;
use crate::pipelines::checkout_pipeline::TEST_TOKEN_PREFIX;
use crate::pipelines::contexts::ConfirmationCtxData;
use crate::services::invoicing::{issue_for_order, InvoiceAttempt};
use crate::services::order_store::PaymentMatch;
use crate::services::payment_gateway::PaymentStatusOutcome;
use crate::state::AppState;
use std::sync::Arc;
use stepflow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use tracing::{info, warn};

pub fn register_confirmation_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  let invoicing_disabled: SkipCondition<ConfirmationCtxData> =
    Arc::new(|ctx_data: ContextData<ConfirmationCtxData>| !ctx_data.read().app_state.invoice_issuer.is_configured());

  let mut p = Pipeline::<ConfirmationCtxData, AppError>::new(&[
    ("resolve_payment_status", false, None),
    ("mark_order_paid", false, None),
    ("issue_invoice", true, Some(invoicing_disabled)),
  ]);

  // Step 1: a non-paid status stops the run before the order is touched.
  p.on_root("resolve_payment_status", |ctx_data: ContextData<ConfirmationCtxData>| {
    Box::pin(async move {
      let (gateway, token) = {
        let guard = ctx_data.read();
        (guard.app_state.payment_gateway.clone(), guard.token.clone())
      };

      let status = match gateway {
        // Synthetic tokens are only honoured while no gateway is configured.
        None if token.starts_with(TEST_TOKEN_PREFIX) => {
          info!("Test mode: synthetic payment token accepted.");
          PaymentStatusOutcome::Paid {
            conversation_id: None,
            paid_amount: None,
          }
        }
        None => PaymentStatusOutcome::NotPaid {
          code: None,
          message: "Payment could not be verified".to_string(),
        },
        Some(gateway) => gateway.retrieve_status(&token).await?,
      };

      match status {
        PaymentStatusOutcome::Paid {
          conversation_id,
          paid_amount,
        } => {
          let payment = PaymentMatch::new(token)
            .with_conversation_id(conversation_id)
            .with_paid_amount(paid_amount);
          ctx_data.write().payment = Some(payment);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        PaymentStatusOutcome::NotPaid { code, message } => {
          warn!(failure_code = ?code, "Payment not confirmed; order left untouched.");
          ctx_data.write().failure = Some(message);
          Ok(PipelineControl::Stop)
        }
      }
    })
  });

  // Step 2: guarded pending -> paid, only for the order this payment was started for.
  // Zero rows is fine if that order is already paid.
  p.on_root("mark_order_paid", |ctx_data: ContextData<ConfirmationCtxData>| {
    Box::pin(async move {
      let (orders, payment, order_number) = {
        let guard = ctx_data.read();
        (guard.app_state.orders.clone(), guard.payment.clone(), guard.order_number.clone())
      };
      let Some(payment) = payment else {
        return Err(AppError::Internal("payment status was not resolved".to_string()));
      };

      let newly_paid = orders.mark_paid(order_number.as_deref(), &payment).await?;
      let order = match &order_number {
        Some(number) => orders.find_by_number(number).await?,
        None => match orders.find_by_reference(&payment.reference).await? {
          Some(order) => Some(order),
          None => match &payment.conversation_id {
            Some(conversation_id) => orders.find_by_reference(conversation_id).await?,
            None => None,
          },
        },
      };

      let mut guard = ctx_data.write();
      guard.newly_paid = newly_paid;
      match order {
        None => {
          warn!(order_number = ?order_number, "Confirmed payment matches no order.");
          guard.failure = Some("Order not found".to_string());
          Ok::<_, AppError>(PipelineControl::Stop)
        }
        Some(order) if !payment.matches(&order) => {
          warn!(
            order_number = %order.order_number,
            paid_amount = ?payment.paid_amount,
            total = order.total,
            "Confirmed payment belongs to another order or amount; order left untouched."
          );
          guard.failure = Some("Payment does not match this order".to_string());
          Ok(PipelineControl::Stop)
        }
        Some(order) if order.payment_status != PaymentStatus::Paid => {
          warn!(order_number = %order.order_number, status = %order.status, "Order can no longer be paid.");
          guard.failure = Some("Order can no longer be paid".to_string());
          guard.order = Some(order);
          Ok(PipelineControl::Stop)
        }
        Some(order) => {
          if newly_paid {
            info!(order_number = %order.order_number, "Order marked paid.");
          } else {
            info!(order_number = %order.order_number, "Order was already paid.");
          }
          guard.order = Some(order);
          Ok(PipelineControl::Continue)
        }
      }
    })
  });

  // Step 3: invoicing failures never change the buyer's result.
  p.on_root("issue_invoice", |ctx_data: ContextData<ConfirmationCtxData>| {
    Box::pin(async move {
      let (app_state, order_number) = {
        let guard = ctx_data.read();
        let order_number = guard.order.as_ref().map(|o| o.order_number.clone());
        (guard.app_state.clone(), order_number)
      };
      let Some(order_number) = order_number else {
        return Ok::<_, AppError>(PipelineControl::Continue);
      };

      let attempt = issue_for_order(
        app_state.orders.as_ref(),
        app_state.invoice_issuer.as_ref(),
        app_state.config.invoice_tax_rate,
        &order_number,
      )
      .await?;
      if let InvoiceAttempt::Failed(reason) = &attempt {
        warn!(%order_number, %reason, "Invoice will be retried later.");
      }
      ctx_data.write().invoice = Some(attempt);
      Ok(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  info!("Payment confirmation pipeline registered.");
}
