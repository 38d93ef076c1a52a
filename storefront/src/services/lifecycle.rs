// storefront/src/services/lifecycle.rs

//! Order and registration state machines.
//!
//! Orders move `PENDING -> CONFIRMED -> PROCESSING -> SHIPPED -> DELIVERED`
//! and may be cancelled from PENDING or CONFIRMED. Each status change is a
//! guarded datastore write that also settles the order's reservations, so a
//! sweep and a payment callback racing for the same order cannot both win.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Order, OrderDraft, OrderItem, OrderStatus, OwnerKey, ReservationState, Transition};
use crate::services::cart::{CartStore, CartViewLine};
use crate::services::pricing::{self, PricedLine, StoreRates};
use crate::store::{Datastore, OrderTransition};

pub use crate::services::booking::{confirm_seat as confirm_registration, release_seat as expire_registration};

async fn fetch_order(store: &dyn Datastore, order_id: Uuid) -> AppResult<Order> {
  store
    .get_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found.")))
}

fn invalid(from: OrderStatus, to: OrderStatus) -> AppError {
  AppError::InvalidStateTransition {
    entity: "order",
    from: from.to_string(),
    to: to.to_string(),
  }
}

/// Prices the cart, snapshots its items and reserves every line, or nothing.
#[instrument(name = "lifecycle::create_pending_order", skip(store, lines, rates), fields(owner = %owner), err)]
pub async fn create_pending_order(
  store: &dyn Datastore,
  owner: &OwnerKey,
  lines: &[CartViewLine],
  rates: &StoreRates,
  currency: &str,
) -> AppResult<Order> {
  if lines.is_empty() {
    return Err(AppError::Validation("Cart is empty.".to_string()));
  }
  let priced: Vec<PricedLine> = lines.iter().map(CartViewLine::priced).collect();
  let totals = pricing::compute(&priced, rates)?;

  let order_id = Uuid::new_v4();
  let items = lines
    .iter()
    .map(|line| OrderItem {
      id: Uuid::new_v4(),
      order_id,
      product_id: line.product_id,
      product_name: line.product_name.clone(),
      unit_price: line.unit_price,
      quantity: line.quantity,
    })
    .collect();
  let draft = OrderDraft {
    id: order_id,
    owner_key: owner.as_key(),
    totals,
    currency: currency.to_string(),
    items,
  };

  let order = store.create_pending_order(&draft).await?;
  info!(order_id = %order.id, total = order.total, "Pending order created.");
  Ok(order)
}

/// PENDING -> CONFIRMED, committing reservations and clearing the owner's cart.
///
/// Already CONFIRMED (or further along) is a no-op. CANCELLED is an
/// `InvalidStateTransition`.
#[instrument(name = "lifecycle::confirm_order", skip(store, carts, payment_id), err)]
pub async fn confirm_order(
  store: &dyn Datastore,
  carts: &CartStore,
  order_id: Uuid,
  payment_id: &str,
) -> AppResult<Transition> {
  let applied = store
    .transition_order(&OrderTransition {
      order_id,
      from: OrderStatus::Pending,
      to: OrderStatus::Confirmed,
      payment_id: Some(payment_id),
      settle: Some((ReservationState::Held, ReservationState::Committed)),
    })
    .await?;

  let order = fetch_order(store, order_id).await?;
  if !applied {
    if order.status.is_at_or_past(OrderStatus::Confirmed) {
      info!(status = %order.status, "Order already confirmed.");
      return Ok(Transition::AlreadyApplied);
    }
    warn!(status = %order.status, "Order cannot be confirmed.");
    return Err(invalid(order.status, OrderStatus::Confirmed));
  }

  info!("Order confirmed.");
  match OwnerKey::parse(&order.owner_key) {
    Some(owner) => {
      if let Err(e) = carts.clear(&owner).await {
        warn!(error = %e, "Order confirmed but the cart could not be cleared.");
      }
    }
    None => warn!(owner_key = %order.owner_key, "Order has an unrecognised owner key; cart left as is."),
  }
  Ok(Transition::Applied)
}

/// PENDING -> CANCELLED, releasing every HELD reservation.
#[instrument(name = "lifecycle::cancel_pending_order", skip(store), err)]
pub async fn cancel_pending_order(store: &dyn Datastore, order_id: Uuid) -> AppResult<Transition> {
  cancel(store, order_id, OrderStatus::Pending, ReservationState::Held, ReservationState::Released).await
}

/// CONFIRMED -> CANCELLED, restocking every COMMITTED reservation.
#[instrument(name = "lifecycle::cancel_confirmed_order", skip(store), err)]
pub async fn cancel_confirmed_order(store: &dyn Datastore, order_id: Uuid) -> AppResult<Transition> {
  cancel(
    store,
    order_id,
    OrderStatus::Confirmed,
    ReservationState::Committed,
    ReservationState::Restocked,
  )
  .await
}

async fn cancel(
  store: &dyn Datastore,
  order_id: Uuid,
  from: OrderStatus,
  settle_from: ReservationState,
  settle_to: ReservationState,
) -> AppResult<Transition> {
  let applied = store
    .transition_order(&OrderTransition {
      order_id,
      from,
      to: OrderStatus::Cancelled,
      payment_id: None,
      settle: Some((settle_from, settle_to)),
    })
    .await?;
  if applied {
    info!(%from, "Order cancelled.");
    return Ok(Transition::Applied);
  }
  let order = fetch_order(store, order_id).await?;
  if order.status == OrderStatus::Cancelled {
    return Ok(Transition::AlreadyApplied);
  }
  warn!(status = %order.status, expected = %from, "Order cannot be cancelled from its current status.");
  Err(invalid(order.status, OrderStatus::Cancelled))
}

/// Moves an order one step along its path, or cancels it.
///
/// Confirmation is reserved for payment verification and is rejected here.
#[instrument(name = "lifecycle::advance_order", skip(store), err)]
pub async fn advance_order(store: &dyn Datastore, order_id: Uuid, target: OrderStatus) -> AppResult<Transition> {
  let order = fetch_order(store, order_id).await?;
  if order.status == target {
    return Ok(Transition::AlreadyApplied);
  }
  if target == OrderStatus::Confirmed || target == OrderStatus::Pending {
    return Err(AppError::Validation(format!(
      "Orders cannot be moved to {target} directly."
    )));
  }
  if !order.status.can_transition_to(target) {
    warn!(status = %order.status, %target, "Rejected order status change.");
    return Err(invalid(order.status, target));
  }

  if target == OrderStatus::Cancelled {
    return match order.status {
      OrderStatus::Pending => cancel_pending_order(store, order_id).await,
      _ => cancel_confirmed_order(store, order_id).await,
    };
  }

  let applied = store
    .transition_order(&OrderTransition {
      order_id,
      from: order.status,
      to: target,
      payment_id: None,
      settle: None,
    })
    .await?;
  if !applied {
    let current = fetch_order(store, order_id).await?.status;
    if current == target {
      return Ok(Transition::AlreadyApplied);
    }
    return Err(invalid(current, target));
  }
  info!(from = %order.status, to = %target, "Order advanced.");
  Ok(Transition::Applied)
}
