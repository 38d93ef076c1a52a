// storefront/src/services/payment_gate.rs

//! Verification of gateway payment callbacks.
//!
//! A callback is trusted only if its signature is the HMAC-SHA256 of
//! `gatewayOrderId|gatewayPaymentId` under the server's key secret. The
//! gateway order id doubles as the idempotency key: the first verified
//! callback claims it and replays get the recorded result back.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use atelier_flow::{ContextData, PipelineResult};

use crate::errors::{AppError, Result as AppResult};
use crate::models::AttemptTarget;
use crate::pipelines::contexts::{OrderPaymentCtxData, RegistrationPaymentCtxData};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallback {
  pub gateway_order_id: String,
  pub gateway_payment_id: String,
  pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
  pub target: AttemptTarget,
  /// Status of the order or registration after verification.
  pub status: String,
  /// True when this callback was a replay of one already applied.
  pub already_processed: bool,
}

fn keyed_mac(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> AppResult<HmacSha256> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
    .map_err(|_| AppError::Config("payment key secret cannot key an HMAC".to_string()))?;
  mac.update(gateway_order_id.as_bytes());
  mac.update(b"|");
  mac.update(gateway_payment_id.as_bytes());
  Ok(mac)
}

/// Hex signature the gateway sends for this pair of ids.
pub fn sign(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> AppResult<String> {
  let mac = keyed_mac(secret, gateway_order_id, gateway_payment_id)?;
  Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of `callback.signature`.
pub fn verify_signature(secret: &str, callback: &PaymentCallback) -> AppResult<()> {
  let provided = hex::decode(callback.signature.trim()).map_err(|_| {
    warn!(gateway_order_id = %callback.gateway_order_id, "Payment signature is not hex.");
    AppError::SignatureInvalid
  })?;
  keyed_mac(secret, &callback.gateway_order_id, &callback.gateway_payment_id)?
    .verify_slice(&provided)
    .map_err(|_| {
      warn!(gateway_order_id = %callback.gateway_order_id, "Payment signature mismatch.");
      AppError::SignatureInvalid
    })
}

/// Confirms `order_id` from a gateway callback, at most once.
pub async fn verify_order_payment(
  app_state: &AppState,
  order_id: Uuid,
  callback: PaymentCallback,
) -> AppResult<VerifyOutcome> {
  let ctx = ContextData::new(OrderPaymentCtxData::new(app_state.clone(), order_id, callback));
  let result = app_state.flow.run(ctx.clone()).await?;
  let (status, already_processed) = ctx.with(|d| (d.status.map(|s| s.to_string()), d.already_processed));
  finish(result, AttemptTarget::Order(order_id), status, already_processed)
}

/// Marks `registration_id` paid from a gateway callback, at most once.
pub async fn verify_registration_payment(
  app_state: &AppState,
  registration_id: Uuid,
  callback: PaymentCallback,
) -> AppResult<VerifyOutcome> {
  let ctx = ContextData::new(RegistrationPaymentCtxData::new(
    app_state.clone(),
    registration_id,
    callback,
  ));
  let result = app_state.flow.run(ctx.clone()).await?;
  let (status, already_processed) = ctx.with(|d| (d.status.map(|s| s.to_string()), d.already_processed));
  finish(
    result,
    AttemptTarget::Registration(registration_id),
    status,
    already_processed,
  )
}

fn finish(
  result: PipelineResult,
  target: AttemptTarget,
  status: Option<String>,
  already_processed: bool,
) -> AppResult<VerifyOutcome> {
  if result == PipelineResult::Stopped && !already_processed {
    return Err(AppError::PipelineHaltedByHandler);
  }
  let status = status.ok_or_else(|| AppError::Internal("verification finished without a status".to_string()))?;
  info!(?target, %status, already_processed, "Payment verified.");
  Ok(VerifyOutcome {
    target,
    status,
    already_processed,
  })
}
