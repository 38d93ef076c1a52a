// storefront/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::cart_line::LineInput;
use crate::services::cart::CartViewLine;
use crate::services::pricing;
use crate::state::AppState;
use crate::web::extractors::{AuthenticatedUser, CartOwner};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LinePayload {
  pub product_id: Uuid,
  pub quantity: i32,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RemoveQuery {
  pub product_id: Uuid,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MergePayload {
  pub guest_token: String,
  /// Lines held by the client. When absent the server-side guest cart is used.
  #[serde(default)]
  pub guest_lines: Option<Vec<LineInput>>,
}

#[instrument(name = "handler::get_cart", skip(app_state, owner), fields(owner = %owner.0))]
pub async fn get_cart_handler(app_state: web::Data<AppState>, owner: CartOwner) -> Result<HttpResponse, AppError> {
  let items = app_state.carts.get_cart(&owner.0).await?;
  Ok(HttpResponse::Ok().json(json!({ "items": items })))
}

#[instrument(
  name = "handler::add_to_cart",
  skip(app_state, payload, owner),
  fields(owner = %owner.0, product_id = %payload.product_id, quantity = payload.quantity)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<LinePayload>,
  owner: CartOwner,
) -> Result<HttpResponse, AppError> {
  let line = app_state
    .carts
    .add_line(&owner.0, payload.product_id, payload.quantity)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
    "message": "Item added to cart successfully.",
    "line": line
  })))
}

#[instrument(
  name = "handler::update_cart",
  skip(app_state, payload, owner),
  fields(owner = %owner.0, product_id = %payload.product_id, quantity = payload.quantity)
)]
pub async fn update_cart_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<LinePayload>,
  owner: CartOwner,
) -> Result<HttpResponse, AppError> {
  let line = app_state
    .carts
    .update_line(&owner.0, payload.product_id, payload.quantity)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "line": line })))
}

#[instrument(name = "handler::remove_from_cart", skip(app_state, query, owner), fields(owner = %owner.0))]
pub async fn remove_from_cart_handler(
  app_state: web::Data<AppState>,
  query: web::Query<RemoveQuery>,
  owner: CartOwner,
) -> Result<HttpResponse, AppError> {
  let removed = app_state.carts.remove_line(&owner.0, query.product_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "removed": removed })))
}

#[instrument(name = "handler::clear_cart", skip(app_state, owner), fields(owner = %owner.0))]
pub async fn clear_cart_handler(app_state: web::Data<AppState>, owner: CartOwner) -> Result<HttpResponse, AppError> {
  let removed = app_state.carts.clear(&owner.0).await?;
  Ok(HttpResponse::Ok().json(json!({ "removed": removed })))
}

#[instrument(name = "handler::merge_cart", skip(app_state, payload, user), fields(user_id = %user.user_id))]
pub async fn merge_cart_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<MergePayload>,
  user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let MergePayload {
    guest_token,
    guest_lines,
  } = payload.into_inner();
  let outcome = app_state
    .carts
    .merge_guest_into_user(user.user_id, &guest_token, guest_lines)
    .await?;
  let cart = app_state
    .carts
    .get_cart(&crate::models::OwnerKey::User(user.user_id))
    .await?;
  info!(
    adjustments = outcome.adjustments.len(),
    already_merged = outcome.already_merged,
    "Cart merge handled."
  );
  Ok(HttpResponse::Ok().json(json!({
    "cart": cart,
    "adjustments": outcome.adjustments,
    "alreadyMerged": outcome.already_merged,
  })))
}

#[instrument(name = "handler::cart_totals", skip(app_state, owner), fields(owner = %owner.0))]
pub async fn cart_totals_handler(app_state: web::Data<AppState>, owner: CartOwner) -> Result<HttpResponse, AppError> {
  let lines = app_state.carts.get_cart(&owner.0).await?;
  let priced: Vec<_> = lines.iter().map(CartViewLine::priced).collect();
  let rates = pricing::store_rates(&app_state).await?;
  let totals = pricing::compute(&priced, &rates)?;
  Ok(HttpResponse::Ok().json(totals))
}
