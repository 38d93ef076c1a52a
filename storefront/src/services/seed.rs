// storefront/src/services/seed.rs

//! Demo catalog for local runs (`SEED_DB=true`). Ids are fixed so seeding twice
//! updates catalog fields in place; stock and booked seats are never reset.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::errors::Result as AppResult;
use crate::models::{Product, StoreSettings, WorkshopSession};
use crate::services::pricing::StoreRates;
use crate::store::Datastore;

const PRODUCTS: [(u128, &str, &str, i64, i32, i32); 4] = [
  (0x01, "Hand-thrown Mug", "Stoneware mug, speckled glaze.", 120_000, 450, 25),
  (0x02, "Serving Platter", "Wide platter in ash glaze.", 340_000, 1_800, 8),
  (0x03, "Bud Vase", "Small porcelain vase.", 65_000, 200, 40),
  (0x04, "Glaze Sample Set", "Six test tiles.", 90_000, 600, 15),
];

const SESSIONS: [(u128, &str, i64, i32, i64); 2] = [
  (0x101, "Wheel Throwing for Beginners", 250_000, 8, 7),
  (0x102, "Glazing Masterclass", 400_000, 6, 14),
];

pub fn seeded_id(n: u128) -> Uuid {
  Uuid::from_u128(0xa7e1_0000_0000_0000_0000_0000_0000_0000 | n)
}

pub async fn seed_catalog(store: &dyn Datastore, rates: &StoreRates) -> AppResult<()> {
  for (n, name, description, price, weight, stock) in PRODUCTS {
    let mut product = Product::new(name, price, weight, stock);
    product.id = seeded_id(n);
    product.description = Some(description.to_string());
    store.upsert_product(&product).await?;
  }

  for (n, title, price, seats, days_out) in SESSIONS {
    let mut session = WorkshopSession::new(title, price, seats, Utc::now() + Duration::days(days_out));
    session.id = seeded_id(n);
    session.workshop_id = seeded_id(n + 0x100);
    store.upsert_session(&session).await?;
  }

  if store.store_settings().await?.is_none() {
    store.save_store_settings(&StoreSettings::from(rates)).await?;
  }

  info!(
    products = PRODUCTS.len(),
    sessions = SESSIONS.len(),
    "Catalog seeded."
  );
  Ok(())
}
