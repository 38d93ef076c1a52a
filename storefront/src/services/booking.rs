// storefront/src/services/booking.rs

//! Seats per workshop session.
//!
//! A seat is taken together with a PENDING registration and given back when
//! that registration fails. `seats_booked` never leaves `0..=seats_total`.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};
use crate::models::{PaymentStatus, Registration, RegistrationDraft, Transition};
use crate::store::Datastore;

fn require(field: &str, value: &str) -> AppResult<()> {
  if value.trim().is_empty() {
    return Err(AppError::Validation(format!("{field} must not be empty.")));
  }
  Ok(())
}

/// Books one seat and creates the PENDING registration holding it.
///
/// Fails with `SessionFull` when no seat is left.
#[instrument(name = "booking::reserve_seat", skip(store, draft), fields(session_id = %draft.session_id), err)]
pub async fn reserve_seat(store: &dyn Datastore, draft: &RegistrationDraft) -> AppResult<Registration> {
  require("customerName", &draft.customer_name)?;
  require("customerEmail", &draft.customer_email)?;
  require("customerPhone", &draft.customer_phone)?;
  if !draft.customer_email.contains('@') {
    return Err(AppError::Validation("customerEmail is not a valid address.".to_string()));
  }

  let registration = store.reserve_seat(draft).await?;
  info!(registration_id = %registration.id, amount = registration.amount_paid, "Seat reserved.");
  Ok(registration)
}

/// PENDING -> PAID. The seat stays booked.
#[instrument(name = "booking::confirm_seat", skip(store, payment_id), err)]
pub async fn confirm_seat(store: &dyn Datastore, registration_id: Uuid, payment_id: &str) -> AppResult<Transition> {
  if store.confirm_registration(registration_id, payment_id).await? {
    info!("Registration paid.");
    return Ok(Transition::Applied);
  }
  let registration = fetch(store, registration_id).await?;
  match registration.payment_status {
    PaymentStatus::Paid => Ok(Transition::AlreadyApplied),
    current => {
      warn!(%current, "Registration can no longer be confirmed.");
      Err(AppError::InvalidStateTransition {
        entity: "registration",
        from: current.to_string(),
        to: PaymentStatus::Paid.to_string(),
      })
    }
  }
}

/// PENDING -> FAILED, giving the seat back.
///
/// Returns `false` when the registration had already left PENDING.
#[instrument(name = "booking::release_seat", skip(store), err)]
pub async fn release_seat(store: &dyn Datastore, registration_id: Uuid) -> AppResult<bool> {
  if store.expire_registration(registration_id).await? {
    info!("Seat released.");
    return Ok(true);
  }
  fetch(store, registration_id).await?;
  Ok(false)
}

async fn fetch(store: &dyn Datastore, registration_id: Uuid) -> AppResult<Registration> {
  store
    .get_registration(registration_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Registration {registration_id} not found.")))
}
