// storefront/src/pipelines/workshop_pipeline.rs

//! Workshop checkout: one seat plus a PENDING registration, then a gateway order.

use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use atelier_flow::{ContextData, FlowRegistry, Pipeline, PipelineControl, PipelineResult};

use crate::errors::{AppError, Result as AppResult};
use crate::models::RegistrationDraft;
use crate::pipelines::common_steps::{self, missing};
use crate::pipelines::contexts::WorkshopCheckoutCtxData;
use crate::services::booking;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopReceipt {
  pub registration_id: Uuid,
  pub gateway_order_id: String,
  pub amount: i64,
  pub currency: String,
  pub key_id: String,
}

pub fn register_workshop_checkout_pipeline(flow: &FlowRegistry<AppError>) {
  let mut p = Pipeline::<WorkshopCheckoutCtxData, AppError>::new(&[
    ("load_session", false, None),
    ("reserve_seat", false, None),
    ("create_gateway_order", false, None),
    ("bind_gateway_order", false, None),
  ]);

  p.on_step("load_session", load_session);
  p.on_step("reserve_seat", reserve_seat);
  p.compensate_step("reserve_seat", release_reserved_seat);
  p.on_step("create_gateway_order", create_gateway_order);
  p.on_step("bind_gateway_order", bind_gateway_order);

  flow.register_pipeline(p);
}

#[instrument(name = "workshop_checkout::run", skip(app_state, draft), fields(session_id = %draft.session_id))]
pub async fn run_workshop_checkout(app_state: &AppState, draft: RegistrationDraft) -> AppResult<WorkshopReceipt> {
  let ctx = ContextData::new(WorkshopCheckoutCtxData::new(app_state.clone(), draft));
  if app_state.flow.run(ctx.clone()).await? == PipelineResult::Stopped {
    return Err(AppError::PipelineHaltedByHandler);
  }

  let (registration, gateway_order) = ctx.with(|d| (d.registration.clone(), d.gateway_order.clone()));
  let registration = registration.ok_or_else(|| missing("registration"))?;
  let gateway_order = gateway_order.ok_or_else(|| missing("gateway order"))?;
  Ok(WorkshopReceipt {
    registration_id: registration.id,
    gateway_order_id: gateway_order.id,
    amount: registration.amount_paid,
    currency: gateway_order.currency,
    key_id: app_state.config.payment_key_id.clone(),
  })
}

async fn load_session(ctx: ContextData<WorkshopCheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, session_id) = ctx.with(|d| (d.app_state.clone(), d.draft.session_id));
  let session = app
    .store
    .get_session(session_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Workshop session {session_id} not found.")))?;
  // The seat reservation re-checks under its own guard.
  if session.seats_available() <= 0 {
    return Err(AppError::SessionFull { session_id });
  }
  ctx.write().session = Some(session);
  Ok(PipelineControl::Continue)
}

async fn reserve_seat(ctx: ContextData<WorkshopCheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, draft) = ctx.with(|d| (d.app_state.clone(), d.draft.clone()));
  let registration = booking::reserve_seat(app.store.as_ref(), &draft).await?;
  ctx.write().registration = Some(registration);
  Ok(PipelineControl::Continue)
}

async fn release_reserved_seat(ctx: ContextData<WorkshopCheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, registration_id) = ctx.with(|d| (d.app_state.clone(), d.registration.as_ref().map(|r| r.id)));
  if let Some(registration_id) = registration_id {
    warn!(%registration_id, "Workshop checkout failed after the seat was taken; releasing it.");
    booking::release_seat(app.store.as_ref(), registration_id).await?;
  }
  Ok(PipelineControl::Continue)
}

async fn create_gateway_order(ctx: ContextData<WorkshopCheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, registration) = ctx.with(|d| (d.app_state.clone(), d.registration.clone()));
  let registration = registration.ok_or_else(|| missing("registration"))?;
  let gateway_order =
    common_steps::open_gateway_order(&app, registration.amount_paid, &registration.id.to_string()).await?;
  ctx.write().gateway_order = Some(gateway_order);
  Ok(PipelineControl::Continue)
}

async fn bind_gateway_order(ctx: ContextData<WorkshopCheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, registration_id, gateway_order_id) = ctx.with(|d| {
    (
      d.app_state.clone(),
      d.registration.as_ref().map(|r| r.id),
      d.gateway_order.as_ref().map(|g| g.id.clone()),
    )
  });
  let registration_id = registration_id.ok_or_else(|| missing("registration"))?;
  let gateway_order_id = gateway_order_id.ok_or_else(|| missing("gateway order"))?;

  if !app
    .store
    .bind_registration_gateway(registration_id, &gateway_order_id)
    .await?
  {
    return Err(AppError::ReservationExpired(format!(
      "registration {registration_id} is no longer pending"
    )));
  }
  if let Some(registration) = ctx.write().registration.as_mut() {
    registration.gateway_order_id = Some(gateway_order_id);
  }
  Ok(PipelineControl::Continue)
}
