// storefront/src/models/reservation.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

/// `HELD -> COMMITTED | RELEASED`, `COMMITTED -> RESTOCKED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, SqlxType)]
#[sqlx(type_name = "reservation_state_enum", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationState {
  Held,
  Committed,
  Released,
  Restocked,
}

impl ReservationState {
  /// Whether moving into this state hands the units back to stock.
  pub fn returns_stock(self) -> bool {
    matches!(self, ReservationState::Released | ReservationState::Restocked)
  }

  pub fn can_transition_to(self, next: ReservationState) -> bool {
    matches!(
      (self, next),
      (ReservationState::Held, ReservationState::Committed)
        | (ReservationState::Held, ReservationState::Released)
        | (ReservationState::Committed, ReservationState::Restocked)
    )
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
  pub id: Uuid,
  pub order_id: Option<Uuid>,
  pub product_id: Uuid,
  pub quantity: i32,
  pub state: ReservationState,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
