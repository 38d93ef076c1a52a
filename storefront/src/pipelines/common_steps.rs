// storefront/src/pipelines/common_steps.rs

//! Step bodies shared by the order and workshop pipelines.

use tracing::{info, instrument, warn};

use crate::errors::{AppError, Result as AppResult};
use crate::models::{AttemptOutcome, AttemptTarget, NewPaymentAttempt};
use crate::services::gateway::GatewayOrder;
use crate::services::payment_gate::{self, PaymentCallback};
use crate::state::AppState;
use crate::store::AttemptClaim;

/// What the verification pipeline should do after claiming the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
  /// Apply the transition (new claim, or an earlier claim that never finished).
  Proceed,
  /// The same gateway order was already confirmed; return the recorded result.
  Replay,
}

pub fn check_signature(app_state: &AppState, callback: &PaymentCallback) -> AppResult<()> {
  payment_gate::verify_signature(&app_state.config.payment_key_secret, callback)
}

/// Rejects callbacks whose gateway order id is not the one bound to the target.
pub fn check_binding(bound: Option<&str>, callback: &PaymentCallback, what: &str) -> AppResult<()> {
  if bound == Some(callback.gateway_order_id.as_str()) {
    return Ok(());
  }
  warn!(
    gateway_order_id = %callback.gateway_order_id,
    bound = ?bound,
    "Callback does not belong to this {what}."
  );
  Err(AppError::Validation(format!(
    "gatewayOrderId does not match the {what}."
  )))
}

#[instrument(name = "common_step::claim_attempt", skip(app_state, callback), fields(gateway_order_id = %callback.gateway_order_id), err)]
pub async fn claim_attempt(
  app_state: &AppState,
  callback: &PaymentCallback,
  target: AttemptTarget,
) -> AppResult<ClaimDecision> {
  let attempt = NewPaymentAttempt {
    gateway_order_id: callback.gateway_order_id.clone(),
    gateway_payment_id: callback.gateway_payment_id.clone(),
    signature: callback.signature.clone(),
    target,
  };
  match app_state.store.claim_attempt(&attempt).await? {
    AttemptClaim::Claimed(_) => Ok(ClaimDecision::Proceed),
    AttemptClaim::Existing(existing) => {
      if existing.target() != Some(target) {
        return Err(AppError::Validation(
          "gatewayOrderId was already used for another purchase.".to_string(),
        ));
      }
      match existing.outcome {
        AttemptOutcome::Confirmed => {
          info!("Duplicate callback; returning the recorded result.");
          Ok(ClaimDecision::Replay)
        }
        AttemptOutcome::Expired => Err(AppError::ReservationExpired(
          "the reservation expired before payment was verified".to_string(),
        )),
        AttemptOutcome::Pending => {
          info!("Resuming an unfinished verification.");
          Ok(ClaimDecision::Proceed)
        }
      }
    }
  }
}

pub async fn record_outcome(app_state: &AppState, callback: &PaymentCallback, outcome: AttemptOutcome) -> AppResult<()> {
  app_state
    .store
    .record_attempt_outcome(&callback.gateway_order_id, outcome)
    .await
}

/// Opens a gateway order in the configured currency.
#[instrument(name = "common_step::open_gateway_order", skip(app_state), err)]
pub async fn open_gateway_order(app_state: &AppState, amount: i64, receipt: &str) -> AppResult<GatewayOrder> {
  let order = app_state
    .gateway
    .create_order(amount, &app_state.config.currency, receipt)
    .await?;
  info!(gateway_order_id = %order.id, "Gateway order opened.");
  Ok(order)
}

/// Builds the error a step returns when its context lacks an earlier step's output.
pub fn missing(what: &str) -> AppError {
  AppError::Internal(format!("{what} is not set in the pipeline context"))
}
