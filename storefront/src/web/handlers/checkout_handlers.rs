// storefront/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::checkout_pipeline;
use crate::services::payment_gate::{self, PaymentCallback};
use crate::state::AppState;
use crate::web::extractors::CartOwner;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOrderPayload {
  pub order_id: Uuid,
  #[serde(flatten)]
  pub callback: PaymentCallback,
}

#[instrument(name = "handler::start_checkout", skip(app_state, owner), fields(owner = %owner.0))]
pub async fn start_checkout_handler(
  app_state: web::Data<AppState>,
  owner: CartOwner,
) -> Result<HttpResponse, AppError> {
  let receipt = checkout_pipeline::run_checkout(&app_state, owner.0).await?;
  info!(order_id = %receipt.order_id, gateway_order_id = %receipt.gateway_order_id, "Checkout started.");
  Ok(HttpResponse::Ok().json(receipt))
}

#[instrument(
  name = "handler::verify_checkout",
  skip(app_state, payload),
  fields(order_id = %payload.order_id, gateway_order_id = %payload.callback.gateway_order_id)
)]
pub async fn verify_checkout_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<VerifyOrderPayload>,
) -> Result<HttpResponse, AppError> {
  let VerifyOrderPayload { order_id, callback } = payload.into_inner();
  let outcome = payment_gate::verify_order_payment(&app_state, order_id, callback).await?;
  Ok(HttpResponse::Ok().json(outcome))
}
