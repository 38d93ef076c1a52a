// storefront/src/pipelines/verify_pipeline.rs

//! Payment callback verification for orders and workshop registrations.
//!
//! `verify_signature -> match_target -> claim_attempt -> apply_transition -> notify`.
//! A replayed callback stops after `claim_attempt` with the recorded result.
//! A target that was reclaimed by the sweep records the attempt as expired.

use tracing::{info, warn};

use atelier_flow::{ContextData, FlowRegistry, Pipeline, PipelineControl};

use crate::errors::{AppError, Result as AppResult};
use crate::models::{AttemptOutcome, AttemptTarget, OrderStatus, PaymentStatus, Transition};
use crate::pipelines::common_steps::{self, missing, ClaimDecision};
use crate::pipelines::contexts::{OrderPaymentCtxData, RegistrationPaymentCtxData};
use crate::services::notifier::{self, Notification};
use crate::services::{booking, lifecycle};

const STEPS: [(&str, bool); 5] = [
  ("verify_signature", false),
  ("match_target", false),
  ("claim_attempt", false),
  ("apply_transition", false),
  ("notify", true),
];

fn steps<T: Send + Sync + 'static>() -> Vec<(&'static str, bool, Option<atelier_flow::SkipCondition<T>>)> {
  STEPS.iter().map(|(name, optional)| (*name, *optional, None)).collect()
}

pub fn register_order_payment_pipeline(flow: &FlowRegistry<AppError>) {
  let mut p = Pipeline::<OrderPaymentCtxData, AppError>::new(&steps());
  p.on_step("verify_signature", order_verify_signature);
  p.on_step("match_target", order_match_target);
  p.on_step("claim_attempt", order_claim_attempt);
  p.on_step("apply_transition", order_apply_transition);
  p.on_step("notify", order_notify);
  flow.register_pipeline(p);
}

pub fn register_registration_payment_pipeline(flow: &FlowRegistry<AppError>) {
  let mut p = Pipeline::<RegistrationPaymentCtxData, AppError>::new(&steps());
  p.on_step("verify_signature", registration_verify_signature);
  p.on_step("match_target", registration_match_target);
  p.on_step("claim_attempt", registration_claim_attempt);
  p.on_step("apply_transition", registration_apply_transition);
  p.on_step("notify", registration_notify);
  flow.register_pipeline(p);
}

// --- Orders ---

async fn order_verify_signature(ctx: ContextData<OrderPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, callback) = ctx.with(|d| (d.app_state.clone(), d.callback.clone()));
  common_steps::check_signature(&app, &callback)?;
  Ok(PipelineControl::Continue)
}

async fn order_match_target(ctx: ContextData<OrderPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, order_id, callback) = ctx.with(|d| (d.app_state.clone(), d.order_id, d.callback.clone()));
  let order = app
    .store
    .get_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found.")))?;
  common_steps::check_binding(order.gateway_order_id.as_deref(), &callback, "order")?;
  let mut guard = ctx.write();
  guard.status = Some(order.status);
  guard.order = Some(order);
  Ok(PipelineControl::Continue)
}

async fn order_claim_attempt(ctx: ContextData<OrderPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, order_id, callback) = ctx.with(|d| (d.app_state.clone(), d.order_id, d.callback.clone()));
  match common_steps::claim_attempt(&app, &callback, AttemptTarget::Order(order_id)).await? {
    ClaimDecision::Proceed => Ok(PipelineControl::Continue),
    ClaimDecision::Replay => {
      // The status read in match_target may predate the first delivery's confirmation.
      let current = app.store.get_order(order_id).await?.map(|o| o.status);
      let mut guard = ctx.write();
      guard.already_processed = true;
      if current.is_some() {
        guard.status = current;
      }
      Ok(PipelineControl::Stop)
    }
  }
}

async fn order_apply_transition(ctx: ContextData<OrderPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, order_id, callback) = ctx.with(|d| (d.app_state.clone(), d.order_id, d.callback.clone()));
  match lifecycle::confirm_order(app.store.as_ref(), &app.carts, order_id, &callback.gateway_payment_id).await {
    Ok(transition) => {
      common_steps::record_outcome(&app, &callback, AttemptOutcome::Confirmed).await?;
      let mut guard = ctx.write();
      if transition == Transition::AlreadyApplied {
        guard.already_processed = true;
        if guard.status == Some(OrderStatus::Pending) {
          guard.status = Some(OrderStatus::Confirmed);
        }
        return Ok(PipelineControl::Stop);
      }
      guard.status = Some(OrderStatus::Confirmed);
      if let Some(order) = guard.order.as_mut() {
        order.status = OrderStatus::Confirmed;
        order.payment_id = Some(callback.gateway_payment_id.clone());
      }
      Ok(PipelineControl::Continue)
    }
    Err(AppError::InvalidStateTransition { from, .. }) => {
      warn!(%order_id, %from, "Payment arrived for an order that is no longer pending.");
      common_steps::record_outcome(&app, &callback, AttemptOutcome::Expired).await?;
      Err(AppError::ReservationExpired(format!(
        "order {order_id} was {from} before payment was verified"
      )))
    }
    Err(e) => Err(e),
  }
}

async fn order_notify(ctx: ContextData<OrderPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, order) = ctx.with(|d| (d.app_state.clone(), d.order.clone()));
  let order = order.ok_or_else(|| missing("order"))?;
  notifier::dispatch(
    app.notifier.clone(),
    Notification::OrderConfirmed {
      order_id: order.id,
      owner_key: order.owner_key,
      total: order.total,
      currency: order.currency,
    },
  );
  info!(order_id = %order.id, "Order confirmation notification queued.");
  Ok(PipelineControl::Continue)
}

// --- Registrations ---

async fn registration_verify_signature(ctx: ContextData<RegistrationPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, callback) = ctx.with(|d| (d.app_state.clone(), d.callback.clone()));
  common_steps::check_signature(&app, &callback)?;
  Ok(PipelineControl::Continue)
}

async fn registration_match_target(ctx: ContextData<RegistrationPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, registration_id, callback) = ctx.with(|d| (d.app_state.clone(), d.registration_id, d.callback.clone()));
  let registration = app
    .store
    .get_registration(registration_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Registration {registration_id} not found.")))?;
  common_steps::check_binding(registration.gateway_order_id.as_deref(), &callback, "registration")?;
  let mut guard = ctx.write();
  guard.status = Some(registration.payment_status);
  guard.registration = Some(registration);
  Ok(PipelineControl::Continue)
}

async fn registration_claim_attempt(ctx: ContextData<RegistrationPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, registration_id, callback) = ctx.with(|d| (d.app_state.clone(), d.registration_id, d.callback.clone()));
  match common_steps::claim_attempt(&app, &callback, AttemptTarget::Registration(registration_id)).await? {
    ClaimDecision::Proceed => Ok(PipelineControl::Continue),
    ClaimDecision::Replay => {
      let current = app.store.get_registration(registration_id).await?.map(|r| r.payment_status);
      let mut guard = ctx.write();
      guard.already_processed = true;
      if current.is_some() {
        guard.status = current;
      }
      Ok(PipelineControl::Stop)
    }
  }
}

async fn registration_apply_transition(ctx: ContextData<RegistrationPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, registration_id, callback) = ctx.with(|d| (d.app_state.clone(), d.registration_id, d.callback.clone()));
  match booking::confirm_seat(app.store.as_ref(), registration_id, &callback.gateway_payment_id).await {
    Ok(transition) => {
      common_steps::record_outcome(&app, &callback, AttemptOutcome::Confirmed).await?;
      let mut guard = ctx.write();
      guard.status = Some(PaymentStatus::Paid);
      if transition == Transition::AlreadyApplied {
        guard.already_processed = true;
        return Ok(PipelineControl::Stop);
      }
      if let Some(registration) = guard.registration.as_mut() {
        registration.payment_status = PaymentStatus::Paid;
        registration.payment_id = Some(callback.gateway_payment_id.clone());
      }
      Ok(PipelineControl::Continue)
    }
    Err(AppError::InvalidStateTransition { from, .. }) => {
      warn!(%registration_id, %from, "Payment arrived for a registration that is no longer pending.");
      common_steps::record_outcome(&app, &callback, AttemptOutcome::Expired).await?;
      Err(AppError::ReservationExpired(format!(
        "registration {registration_id} was {from} before payment was verified"
      )))
    }
    Err(e) => Err(e),
  }
}

async fn registration_notify(ctx: ContextData<RegistrationPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app, registration) = ctx.with(|d| (d.app_state.clone(), d.registration.clone()));
  let registration = registration.ok_or_else(|| missing("registration"))?;
  notifier::dispatch(
    app.notifier.clone(),
    Notification::RegistrationConfirmed {
      registration_id: registration.id,
      session_id: registration.session_id,
      customer_name: registration.customer_name,
      customer_email: registration.customer_email,
    },
  );
  Ok(PipelineControl::Continue)
}
