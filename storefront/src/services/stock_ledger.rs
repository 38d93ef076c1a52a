// storefront/src/services/stock_ledger.rs

//! Purchasable units per product.
//!
//! Stock leaves a product only through a HELD reservation and comes back only
//! when a reservation is RELEASED or RESTOCKED. Each call here is one guarded
//! datastore operation; a lost race shows up as `OutOfStock` or as
//! [`Transition::AlreadyApplied`], never as a negative count.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};
use crate::models::{ReservationState, Transition};
use crate::store::Datastore;

/// Takes `quantity` units of `product_id` out of stock and returns the reservation id.
#[instrument(name = "ledger::reserve", skip(store), err)]
pub async fn reserve(store: &dyn Datastore, product_id: Uuid, quantity: i32) -> AppResult<Uuid> {
  if quantity < 1 {
    return Err(AppError::Validation("Quantity must be a positive number.".to_string()));
  }
  let reservation = store.reserve_stock(None, product_id, quantity).await?;
  info!(reservation_id = %reservation.id, "Stock reserved.");
  Ok(reservation.id)
}

/// HELD -> RELEASED, returning the units. Releasing twice is a no-op.
pub async fn release(store: &dyn Datastore, reservation_id: Uuid) -> AppResult<Transition> {
  move_one(store, reservation_id, ReservationState::Held, ReservationState::Released).await
}

/// HELD -> COMMITTED. The units stay sold.
pub async fn commit(store: &dyn Datastore, reservation_id: Uuid) -> AppResult<Transition> {
  move_one(store, reservation_id, ReservationState::Held, ReservationState::Committed).await
}

/// COMMITTED -> RESTOCKED, returning the units of a cancelled sale.
pub async fn restock(store: &dyn Datastore, reservation_id: Uuid) -> AppResult<Transition> {
  move_one(store, reservation_id, ReservationState::Committed, ReservationState::Restocked).await
}

/// Commits every HELD reservation of a confirmed order.
pub async fn decrement_on_order(store: &dyn Datastore, order_id: Uuid) -> AppResult<u64> {
  store
    .settle_order_reservations(order_id, ReservationState::Held, ReservationState::Committed)
    .await
}

/// Releases every HELD reservation of an abandoned order.
pub async fn release_order(store: &dyn Datastore, order_id: Uuid) -> AppResult<u64> {
  store
    .settle_order_reservations(order_id, ReservationState::Held, ReservationState::Released)
    .await
}

/// Restocks every COMMITTED reservation of a cancelled order.
pub async fn restock_on_cancel(store: &dyn Datastore, order_id: Uuid) -> AppResult<u64> {
  store
    .settle_order_reservations(order_id, ReservationState::Committed, ReservationState::Restocked)
    .await
}

async fn move_one(
  store: &dyn Datastore,
  reservation_id: Uuid,
  from: ReservationState,
  to: ReservationState,
) -> AppResult<Transition> {
  if store.transition_reservation(reservation_id, from, to).await? {
    info!(%reservation_id, ?from, ?to, "Reservation settled.");
    return Ok(Transition::Applied);
  }
  let reservation = store
    .get_reservation(reservation_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Reservation {reservation_id} not found.")))?;
  if reservation.state == to {
    return Ok(Transition::AlreadyApplied);
  }
  warn!(%reservation_id, current = ?reservation.state, target = ?to, "Reservation cannot move.");
  Err(AppError::InvalidStateTransition {
    entity: "reservation",
    from: format!("{:?}", reservation.state).to_uppercase(),
    to: format!("{to:?}").to_uppercase(),
  })
}
