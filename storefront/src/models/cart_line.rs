// storefront/src/models/cart_line.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Whose cart a line belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerKey {
  Guest(String),
  User(Uuid),
}

impl OwnerKey {
  pub fn is_guest(&self) -> bool {
    matches!(self, OwnerKey::Guest(_))
  }

  /// The column value stored in `cart_lines.owner_key` and `orders.owner_key`.
  pub fn as_key(&self) -> String {
    self.to_string()
  }

  /// Inverse of [`OwnerKey::as_key`].
  pub fn parse(key: &str) -> Option<Self> {
    if let Some(token) = key.strip_prefix("guest:") {
      return (!token.is_empty()).then(|| OwnerKey::Guest(token.to_string()));
    }
    key
      .strip_prefix("user:")
      .and_then(|id| Uuid::parse_str(id).ok())
      .map(OwnerKey::User)
  }
}

impl fmt::Display for OwnerKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OwnerKey::Guest(token) => write!(f, "guest:{token}"),
      OwnerKey::User(id) => write!(f, "user:{id}"),
    }
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
  pub owner_key: String,
  pub product_id: Uuid,
  /// Always at least one; a zero quantity deletes the line instead.
  pub quantity: i32,
  pub added_at: DateTime<Utc>,
}

/// A line as the client sends it, e.g. a guest cart held in the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInput {
  pub product_id: Uuid,
  pub quantity: i32,
}
