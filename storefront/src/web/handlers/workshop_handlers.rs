// storefront/src/web/handlers/workshop_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::RegistrationDraft;
use crate::pipelines::workshop_pipeline;
use crate::services::payment_gate::{self, PaymentCallback};
use crate::state::AppState;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopCheckoutPayload {
  pub session_id: Uuid,
  pub customer_name: String,
  pub customer_email: String,
  pub customer_phone: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRegistrationPayload {
  pub registration_id: Uuid,
  #[serde(flatten)]
  pub callback: PaymentCallback,
}

#[instrument(name = "handler::workshop_checkout", skip(app_state, payload), fields(session_id = %payload.session_id))]
pub async fn workshop_checkout_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<WorkshopCheckoutPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let draft = RegistrationDraft {
    id: Uuid::new_v4(),
    session_id: payload.session_id,
    customer_name: payload.customer_name,
    customer_email: payload.customer_email,
    customer_phone: payload.customer_phone,
  };
  let receipt = workshop_pipeline::run_workshop_checkout(&app_state, draft).await?;
  info!(registration_id = %receipt.registration_id, "Workshop checkout started.");
  Ok(HttpResponse::Ok().json(receipt))
}

#[instrument(
  name = "handler::verify_workshop",
  skip(app_state, payload),
  fields(registration_id = %payload.registration_id, gateway_order_id = %payload.callback.gateway_order_id)
)]
pub async fn verify_workshop_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<VerifyRegistrationPayload>,
) -> Result<HttpResponse, AppError> {
  let VerifyRegistrationPayload {
    registration_id,
    callback,
  } = payload.into_inner();
  let outcome = payment_gate::verify_registration_payment(&app_state, registration_id, callback).await?;
  Ok(HttpResponse::Ok().json(outcome))
}

#[instrument(name = "handler::get_session", skip(app_state, path), fields(session_id = %path.as_ref()))]
pub async fn get_session_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let session_id = path.into_inner();
  let session = app_state
    .store
    .get_session(session_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Workshop session {session_id} not found.")))?;
  let seats_available = session.seats_available();
  Ok(HttpResponse::Ok().json(json!({
    "session": session,
    "seatsAvailable": seats_available,
  })))
}
