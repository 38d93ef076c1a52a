// storefront/src/models/payment_attempt.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, SqlxType)]
#[sqlx(type_name = "attempt_outcome_enum", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptOutcome {
  /// Claimed; the transition has not been recorded yet.
  Pending,
  Confirmed,
  /// The target was already reclaimed when the callback arrived.
  Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AttemptTarget {
  Order(Uuid),
  Registration(Uuid),
}

/// Keyed by the gateway order id. At most one row exists per key.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
  pub gateway_order_id: String,
  pub gateway_payment_id: String,
  pub signature: String,
  pub order_id: Option<Uuid>,
  pub registration_id: Option<Uuid>,
  pub outcome: AttemptOutcome,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl PaymentAttempt {
  pub fn target(&self) -> Option<AttemptTarget> {
    match (self.order_id, self.registration_id) {
      (Some(id), None) => Some(AttemptTarget::Order(id)),
      (None, Some(id)) => Some(AttemptTarget::Registration(id)),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct NewPaymentAttempt {
  pub gateway_order_id: String,
  pub gateway_payment_id: String,
  pub signature: String,
  pub target: AttemptTarget,
}
