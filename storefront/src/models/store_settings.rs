// storefront/src/models/store_settings.rs

use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::services::pricing::StoreRates;

#[derive(Debug, Clone, FromRow)]
pub struct StoreSettings {
  pub shipping_base_rate: i64,
  pub shipping_per_kg_rate: i64,
  pub free_shipping_threshold: i64,
  pub gst_percent: Decimal,
}

impl StoreSettings {
  pub fn into_rates(self) -> StoreRates {
    StoreRates {
      base_rate: self.shipping_base_rate,
      per_kg_rate: self.shipping_per_kg_rate,
      free_shipping_threshold: self.free_shipping_threshold,
      gst_percent: self.gst_percent,
    }
  }
}

impl From<&StoreRates> for StoreSettings {
  fn from(rates: &StoreRates) -> Self {
    Self {
      shipping_base_rate: rates.base_rate,
      shipping_per_kg_rate: rates.per_kg_rate,
      free_shipping_threshold: rates.free_shipping_threshold,
      gst_percent: rates.gst_percent,
    }
  }
}
