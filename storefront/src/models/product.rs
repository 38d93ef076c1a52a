// storefront/src/models/product.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  pub description: Option<String>,
  /// Paise.
  pub price: i64,
  pub weight_grams: i32,
  /// Units on hand. Only the stock ledger writes this column.
  pub stock: i32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Product {
  pub fn new(name: &str, price: i64, weight_grams: i32, stock: i32) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      name: name.to_string(),
      description: None,
      price,
      weight_grams,
      stock,
      created_at: now,
      updated_at: now,
    }
  }
}
