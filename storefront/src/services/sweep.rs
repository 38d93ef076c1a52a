// storefront/src/services/sweep.rs

//! Reclaims reservations whose payment never arrived.
//!
//! PENDING orders and registrations older than the hold window are cancelled
//! or failed through the same guarded transitions a payment callback uses, so
//! whichever of the two gets there first wins and the other sees a no-op.
//! Guest carts left idle past their TTL are dropped on the same pass.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{AppError, Result as AppResult};
use crate::models::Transition;
use crate::services::{booking, lifecycle};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
  pub orders_cancelled: u64,
  pub registrations_expired: u64,
  pub guest_carts_purged: u64,
}

/// One pass over everything created before `now - hold_window`.
#[instrument(name = "sweep::once", skip(app_state), err)]
pub async fn sweep_once(app_state: &AppState, now: DateTime<Utc>) -> AppResult<SweepReport> {
  let cutoff = now - app_state.config.hold_window();
  let store = app_state.store.as_ref();
  let mut report = SweepReport::default();

  for order_id in store.stale_pending_orders(cutoff).await? {
    match lifecycle::cancel_pending_order(store, order_id).await {
      Ok(Transition::Applied) => report.orders_cancelled += 1,
      Ok(Transition::AlreadyApplied) => {}
      // Confirmed by a callback in the meantime.
      Err(AppError::InvalidStateTransition { .. }) => debug!(%order_id, "Order left PENDING before the sweep."),
      Err(e) => warn!(%order_id, error = %e, "Could not cancel a stale order."),
    }
  }

  for registration_id in store.stale_pending_registrations(cutoff).await? {
    match booking::release_seat(store, registration_id).await {
      Ok(true) => report.registrations_expired += 1,
      Ok(false) => debug!(%registration_id, "Registration left PENDING before the sweep."),
      Err(e) => warn!(%registration_id, error = %e, "Could not expire a stale registration."),
    }
  }

  report.guest_carts_purged = app_state
    .carts
    .purge_idle_guest_carts(now - app_state.config.guest_cart_ttl())
    .await?;

  if report != SweepReport::default() {
    info!(
      orders_cancelled = report.orders_cancelled,
      registrations_expired = report.registrations_expired,
      guest_carts_purged = report.guest_carts_purged,
      "Expired holds and idle carts reclaimed."
    );
  }
  Ok(report)
}

/// Runs [`sweep_once`] every `sweep_interval_secs` until the runtime shuts down.
pub fn spawn_sweeper(app_state: AppState) -> JoinHandle<()> {
  let period = Duration::from_secs(app_state.config.sweep_interval_secs);
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs(), "Expiry sweeper started.");
    loop {
      ticker.tick().await;
      if let Err(e) = sweep_once(&app_state, Utc::now()).await {
        error!(error = %e, "Expiry sweep failed.");
      }
    }
  })
}
