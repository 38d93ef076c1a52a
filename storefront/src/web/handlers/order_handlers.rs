// storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Order, OrderStatus};
use crate::services::lifecycle;
use crate::state::AppState;
use crate::web::extractors::{AdminUser, CartOwner};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
  pub status: OrderStatus,
}

async fn load_order(app_state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
  app_state
    .store
    .get_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found.")))
}

/// The order with its item snapshots. Only its owner can see it.
#[instrument(name = "handler::get_order", skip(app_state, path, owner), fields(order_id = %path.as_ref()))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  owner: CartOwner,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let order = load_order(&app_state, order_id).await?;
  if order.owner_key != owner.0.as_key() {
    warn!("Order requested by someone other than its owner.");
    return Err(AppError::NotFound(format!("Order {order_id} not found.")));
  }
  let items = app_state.store.order_items(order_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order, "items": items })))
}

/// Fulfilment moves and cancellation. Administrators only.
#[instrument(
  name = "handler::update_order_status",
  skip(app_state, path, payload, admin),
  fields(order_id = %path.as_ref(), target = %payload.status, admin_id = %admin.user_id)
)]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: web::Json<StatusPayload>,
  admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let transition = lifecycle::advance_order(app_state.store.as_ref(), order_id, payload.status).await?;
  let order = load_order(&app_state, order_id).await?;
  Ok(HttpResponse::Ok().json(json!({
    "order": order,
    "changed": transition == crate::models::Transition::Applied,
  })))
}
