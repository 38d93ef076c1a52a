// storefront/src/pipelines/checkout_pipeline.rs

//! Product checkout: cart -> priced, reserved PENDING order -> gateway order.
//!
//! If the gateway refuses to open an order, the compensation on
//! `reserve_stock` cancels the pending order and its stock goes back.

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use atelier_flow::{ContextData, FlowRegistry, Pipeline, PipelineControl, PipelineResult};

use crate::errors::{AppError, Result as AppResult};
use crate::models::OwnerKey;
use crate::pipelines::common_steps::{self, missing};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::{lifecycle, pricing};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
  pub order_id: Uuid,
  pub gateway_order_id: String,
  pub amount: i64,
  pub currency: String,
  pub key_id: String,
}

pub fn register_checkout_pipeline(flow: &FlowRegistry<AppError>) {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("load_cart", false, None),
    ("price_cart", false, None),
    ("reserve_stock", false, None),
    ("create_gateway_order", false, None),
    ("bind_gateway_order", false, None),
  ]);

  p.on_step("load_cart", load_cart);
  p.on_step("price_cart", price_cart);
  p.on_step("reserve_stock", reserve_stock);
  p.compensate_step("reserve_stock", cancel_reserved_order);
  p.on_step("create_gateway_order", create_gateway_order);
  p.on_step("bind_gateway_order", bind_gateway_order);

  flow.register_pipeline(p);
}

/// Turns the owner's cart into a PENDING order with an open gateway order.
#[instrument(name = "checkout::run", skip(app_state), fields(owner = %owner))]
pub async fn run_checkout(app_state: &AppState, owner: OwnerKey) -> AppResult<CheckoutReceipt> {
  let ctx = ContextData::new(CheckoutCtxData::new(app_state.clone(), owner));
  if app_state.flow.run(ctx.clone()).await? == PipelineResult::Stopped {
    return Err(AppError::PipelineHaltedByHandler);
  }

  let (order, gateway_order) = ctx.with(|d| (d.order.clone(), d.gateway_order.clone()));
  let order = order.ok_or_else(|| missing("order"))?;
  let gateway_order = gateway_order.ok_or_else(|| missing("gateway order"))?;
  Ok(CheckoutReceipt {
    order_id: order.id,
    gateway_order_id: gateway_order.id,
    amount: order.total,
    currency: order.currency,
    key_id: app_state.config.payment_key_id.clone(),
  })
}

async fn load_cart(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, owner) = ctx.with(|d| (d.app_state.clone(), d.owner.clone()));
  let lines = app.carts.get_cart(&owner).await?;
  if lines.is_empty() {
    return Err(AppError::Validation("Cart is empty.".to_string()));
  }
  info!(lines = lines.len(), "Cart loaded for checkout.");
  ctx.write().lines = lines;
  Ok(PipelineControl::Continue)
}

async fn price_cart(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let app = ctx.with(|d| d.app_state.clone());
  let rates = pricing::store_rates(&app).await?;
  rates.validate()?;
  ctx.write().rates = Some(rates);
  Ok(PipelineControl::Continue)
}

async fn reserve_stock(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, owner, lines, rates) = ctx.with(|d| (d.app_state.clone(), d.owner.clone(), d.lines.clone(), d.rates.clone()));
  let rates = rates.ok_or_else(|| missing("store rates"))?;
  let order =
    lifecycle::create_pending_order(app.store.as_ref(), &owner, &lines, &rates, &app.config.currency).await?;
  ctx.write().order = Some(order);
  Ok(PipelineControl::Continue)
}

async fn cancel_reserved_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, order_id) = ctx.with(|d| (d.app_state.clone(), d.order.as_ref().map(|o| o.id)));
  if let Some(order_id) = order_id {
    warn!(%order_id, "Checkout failed after reservation; cancelling the pending order.");
    lifecycle::cancel_pending_order(app.store.as_ref(), order_id).await?;
  }
  Ok(PipelineControl::Continue)
}

async fn create_gateway_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, order) = ctx.with(|d| (d.app_state.clone(), d.order.clone()));
  let order = order.ok_or_else(|| missing("order"))?;
  let gateway_order = common_steps::open_gateway_order(&app, order.total, &order.id.to_string()).await?;
  ctx.write().gateway_order = Some(gateway_order);
  Ok(PipelineControl::Continue)
}

async fn bind_gateway_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app, order_id, gateway_order_id) = ctx.with(|d| {
    (
      d.app_state.clone(),
      d.order.as_ref().map(|o| o.id),
      d.gateway_order.as_ref().map(|g| g.id.clone()),
    )
  });
  let order_id = order_id.ok_or_else(|| missing("order"))?;
  let gateway_order_id = gateway_order_id.ok_or_else(|| missing("gateway order"))?;

  if !app.store.bind_order_gateway(order_id, &gateway_order_id).await? {
    return Err(AppError::ReservationExpired(format!(
      "order {order_id} is no longer pending"
    )));
  }
  if let Some(order) = ctx.write().order.as_mut() {
    order.gateway_order_id = Some(gateway_order_id);
  }
  Ok(PipelineControl::Continue)
}
