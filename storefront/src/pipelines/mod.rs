// storefront/src/pipelines/mod.rs

//! Defines and registers the commerce pipelines.

use atelier_flow::FlowRegistry;

use crate::errors::AppError;

pub mod common_steps;
pub mod contexts;

pub mod checkout_pipeline;
pub mod verify_pipeline;
pub mod workshop_pipeline;

/// Registers every pipeline with `flow`. Called once per `AppState`.
pub fn register_all_pipelines(flow: &FlowRegistry<AppError>) {
  tracing::info!("Registering commerce pipelines...");

  checkout_pipeline::register_checkout_pipeline(flow);
  workshop_pipeline::register_workshop_checkout_pipeline(flow);
  verify_pipeline::register_order_payment_pipeline(flow);
  verify_pipeline::register_registration_payment_pipeline(flow);

  tracing::info!("All commerce pipelines registered.");
}
