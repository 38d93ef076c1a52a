// storefront/src/models/workshop.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopSession {
  pub id: Uuid,
  pub workshop_id: Uuid,
  pub title: String,
  pub starts_at: DateTime<Utc>,
  /// Paise charged per seat.
  pub price: i64,
  pub seats_total: i32,
  /// `0 <= seats_booked <= seats_total`. Only the booking allocator writes it.
  pub seats_booked: i32,
}

impl WorkshopSession {
  pub fn new(title: &str, price: i64, seats_total: i32, starts_at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      workshop_id: Uuid::new_v4(),
      title: title.to_string(),
      starts_at,
      price,
      seats_total,
      seats_booked: 0,
    }
  }

  pub fn seats_available(&self) -> i32 {
    self.seats_total - self.seats_booked
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
  Refunded,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentStatus::Pending => "PENDING",
      PaymentStatus::Paid => "PAID",
      PaymentStatus::Failed => "FAILED",
      PaymentStatus::Refunded => "REFUNDED",
    }
  }
}

impl std::fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
  pub id: Uuid,
  pub session_id: Uuid,
  pub customer_name: String,
  pub customer_email: String,
  pub customer_phone: String,
  pub amount_paid: i64,
  pub payment_status: PaymentStatus,
  pub gateway_order_id: Option<String>,
  pub payment_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RegistrationDraft {
  pub id: Uuid,
  pub session_id: Uuid,
  pub customer_name: String,
  pub customer_email: String,
  pub customer_phone: String,
}
