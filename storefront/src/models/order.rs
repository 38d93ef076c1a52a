// storefront/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

use super::order_item::OrderItem;
use crate::services::pricing::Totals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  /// Position along the forward path; `Cancelled` is off the path.
  fn rank(self) -> Option<u8> {
    match self {
      OrderStatus::Pending => Some(0),
      OrderStatus::Confirmed => Some(1),
      OrderStatus::Processing => Some(2),
      OrderStatus::Shipped => Some(3),
      OrderStatus::Delivered => Some(4),
      OrderStatus::Cancelled => None,
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  /// Single-step forward moves plus cancellation from PENDING or CONFIRMED.
  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    if next == OrderStatus::Cancelled {
      return matches!(self, OrderStatus::Pending | OrderStatus::Confirmed);
    }
    match (self.rank(), next.rank()) {
      (Some(from), Some(to)) => to == from + 1,
      _ => false,
    }
  }

  /// True when `self` is `other` or further along the forward path.
  pub fn is_at_or_past(self, other: OrderStatus) -> bool {
    match (self.rank(), other.rank()) {
      (Some(a), Some(b)) => a >= b,
      _ => self == other,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Confirmed => "CONFIRMED",
      OrderStatus::Processing => "PROCESSING",
      OrderStatus::Shipped => "SHIPPED",
      OrderStatus::Delivered => "DELIVERED",
      OrderStatus::Cancelled => "CANCELLED",
    }
  }
}

impl std::fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub owner_key: String,
  pub status: OrderStatus,
  pub subtotal: i64,
  pub tax: i64,
  pub shipping_cost: i64,
  pub total: i64,
  pub currency: String,
  pub gateway_order_id: Option<String>,
  pub payment_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Everything needed to create a PENDING order and reserve its stock.
#[derive(Debug, Clone)]
pub struct OrderDraft {
  pub id: Uuid,
  pub owner_key: String,
  pub totals: Totals,
  pub currency: String,
  /// Snapshots taken at pricing time.
  pub items: Vec<OrderItem>,
}
