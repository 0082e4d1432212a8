// storefront/src/pipelines/mod.rs

//! Defines and registers the application's workflow pipelines.

use crate::errors::AppError;
use crate::state::AppState;
use std::sync::Arc;
use stepflow::Registry;

pub mod checkout_pipeline;
pub mod confirmation_pipeline;
pub mod contexts;

/// Registers every pipeline with `registry`. Called once at startup.
pub fn register_all_pipelines(registry: &Arc<Registry<AppError>>, app_state: &AppState) {
  tracing::info!("Registering pipelines...");

  checkout_pipeline::register_checkout_pipeline(registry, app_state);
  confirmation_pipeline::register_confirmation_pipeline(registry, app_state);

  tracing::info!("All application pipelines registered.");
}
