// storefront/src/services/pricing.rs

//! Subtotal, shipping and GST for a set of priced lines.
//!
//! All amounts are integer paise and weights are grams. Nothing here touches
//! the datastore except [`store_rates`].

use crate::errors::{AppError, Result as AppResult};
use crate::state::AppState;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const GRAMS_PER_KG: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRates {
  pub base_rate: i64,
  pub per_kg_rate: i64,
  pub free_shipping_threshold: i64,
  pub gst_percent: Decimal,
}

impl Default for StoreRates {
  fn default() -> Self {
    Self {
      base_rate: 5_000,
      per_kg_rate: 4_000,
      free_shipping_threshold: 500_000,
      gst_percent: Decimal::from(12),
    }
  }
}

impl StoreRates {
  pub fn validate(&self) -> AppResult<()> {
    if self.base_rate < 0 || self.per_kg_rate < 0 || self.free_shipping_threshold < 0 {
      return Err(AppError::Config("shipping rates must not be negative".to_string()));
    }
    if self.gst_percent < Decimal::ZERO || self.gst_percent > Decimal::ONE_HUNDRED {
      return Err(AppError::Config(format!(
        "GST percent must be within 0..=100, got {}",
        self.gst_percent
      )));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
  pub product_id: Uuid,
  pub unit_price: i64,
  pub weight_grams: i32,
  pub quantity: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub tax: i64,
  pub total: i64,
}

fn overflow() -> AppError {
  AppError::Validation("cart amount is too large".to_string())
}

/// Shipping for a non-free order of `total_grams`.
pub fn shipping_for_weight(total_grams: i64, rates: &StoreRates) -> AppResult<i64> {
  if total_grams <= GRAMS_PER_KG {
    return Ok(rates.base_rate);
  }
  let extra_kg = (total_grams - 1) / GRAMS_PER_KG;
  extra_kg
    .checked_mul(rates.per_kg_rate)
    .and_then(|extra| extra.checked_add(rates.base_rate))
    .ok_or_else(overflow)
}

/// GST on `subtotal`, rounded half away from zero to the paisa.
pub fn tax_on(subtotal: i64, gst_percent: Decimal) -> AppResult<i64> {
  let tax = Decimal::from(subtotal)
    .checked_mul(gst_percent)
    .ok_or_else(overflow)?
    / Decimal::ONE_HUNDRED;
  tax
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .to_i64()
    .ok_or_else(overflow)
}

/// Prices `lines` against `rates`. An empty set of lines costs nothing.
pub fn compute(lines: &[PricedLine], rates: &StoreRates) -> AppResult<Totals> {
  if lines.is_empty() {
    return Ok(Totals::default());
  }

  let mut subtotal: i64 = 0;
  let mut total_grams: i64 = 0;
  for line in lines {
    let qty = i64::from(line.quantity);
    let line_price = line.unit_price.checked_mul(qty).ok_or_else(overflow)?;
    subtotal = subtotal.checked_add(line_price).ok_or_else(overflow)?;
    total_grams = total_grams
      .checked_add(i64::from(line.weight_grams) * qty)
      .ok_or_else(overflow)?;
  }

  let shipping_cost = if subtotal >= rates.free_shipping_threshold {
    0
  } else {
    shipping_for_weight(total_grams, rates)?
  };
  let tax = tax_on(subtotal, rates.gst_percent)?;
  let total = subtotal
    .checked_add(shipping_cost)
    .and_then(|t| t.checked_add(tax))
    .ok_or_else(overflow)?;

  Ok(Totals {
    subtotal,
    shipping_cost,
    tax,
    total,
  })
}

/// Rates from the datastore's settings, falling back to the configured defaults.
pub async fn store_rates(app_state: &AppState) -> AppResult<StoreRates> {
  match app_state.store.store_settings().await? {
    Some(settings) => Ok(settings.into_rates()),
    None => Ok(app_state.config.default_rates.clone()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shipping_rounds_partial_kilograms_up() {
    let rates = StoreRates::default();
    assert_eq!(shipping_for_weight(0, &rates).unwrap(), 5_000);
    assert_eq!(shipping_for_weight(1_000, &rates).unwrap(), 5_000);
    assert_eq!(shipping_for_weight(1_001, &rates).unwrap(), 9_000);
    assert_eq!(shipping_for_weight(2_000, &rates).unwrap(), 9_000);
    assert_eq!(shipping_for_weight(2_500, &rates).unwrap(), 13_000);
  }

  #[test]
  fn shipping_that_cannot_be_represented_is_rejected() {
    let rates = StoreRates {
      per_kg_rate: i64::MAX / 2,
      ..StoreRates::default()
    };
    assert!(matches!(
      shipping_for_weight(10_000, &rates),
      Err(AppError::Validation(_))
    ));
  }

  #[test]
  fn tax_rounds_half_away_from_zero() {
    assert_eq!(tax_on(1_234, Decimal::new(125, 1)).unwrap(), 154);
    assert_eq!(tax_on(100, Decimal::new(5, 1)).unwrap(), 1);
  }
}
