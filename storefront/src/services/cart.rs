// storefront/src/services/cart.rs

//! Server-side carts for guests and signed-in users, and guest -> user reconciliation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};
use crate::models::cart_line::LineInput;
use crate::models::{CartLine, OwnerKey, Product};
use crate::services::pricing::PricedLine;
use crate::store::{CartMerger, CartRepository, Datastore, GuestCartRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeAdjustment {
  pub product_id: Uuid,
  pub requested: i32,
  pub applied: i32,
}

/// The writes a merge performs and the clamps it reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
  /// Final quantity per product; zero deletes the line.
  pub writes: Vec<(Uuid, i32)>,
  pub adjustments: Vec<MergeAdjustment>,
}

/// Sums guest quantities into the user's lines and clamps each result to stock.
///
/// Products missing from `stock` count as having none. Lines the guest did
/// not touch are left alone.
pub fn plan_merge(user_lines: &[CartLine], guest_lines: &[LineInput], stock: &HashMap<Uuid, i32>) -> MergePlan {
  let mut guest_totals: BTreeMap<Uuid, i32> = BTreeMap::new();
  for line in guest_lines.iter().filter(|l| l.quantity > 0) {
    let entry = guest_totals.entry(line.product_id).or_default();
    *entry = entry.saturating_add(line.quantity);
  }

  let mut plan = MergePlan::default();
  for (product_id, guest_qty) in guest_totals {
    let existing = user_lines
      .iter()
      .find(|l| l.product_id == product_id)
      .map_or(0, |l| l.quantity);
    let requested = existing.saturating_add(guest_qty);
    let available = stock.get(&product_id).copied().unwrap_or(0).max(0);
    let applied = requested.min(available);
    if applied != requested {
      plan.adjustments.push(MergeAdjustment {
        product_id,
        requested,
        applied,
      });
    }
    if applied != existing {
      plan.writes.push((product_id, applied));
    }
  }
  plan
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartViewLine {
  pub product_id: Uuid,
  pub product_name: String,
  pub unit_price: i64,
  pub weight_grams: i32,
  pub quantity: i32,
  pub line_total: i64,
}

impl CartViewLine {
  pub fn priced(&self) -> PricedLine {
    PricedLine {
      product_id: self.product_id,
      unit_price: self.unit_price,
      weight_grams: self.weight_grams,
      quantity: self.quantity,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
  pub adjustments: Vec<MergeAdjustment>,
  pub already_merged: bool,
}

/// One cart interface over two backends: guests live in the ephemeral one,
/// users in the durable one.
#[derive(Clone)]
pub struct CartStore {
  durable: Arc<dyn CartMerger>,
  ephemeral: Arc<dyn GuestCartRepository>,
  catalog: Arc<dyn Datastore>,
}

impl CartStore {
  pub fn new(
    durable: Arc<dyn CartMerger>,
    ephemeral: Arc<dyn GuestCartRepository>,
    catalog: Arc<dyn Datastore>,
  ) -> Self {
    Self {
      durable,
      ephemeral,
      catalog,
    }
  }

  fn backend(&self, owner: &OwnerKey) -> &dyn CartRepository {
    if owner.is_guest() {
      self.ephemeral.as_ref()
    } else {
      self.durable.as_ref()
    }
  }

  async fn product(&self, product_id: Uuid) -> AppResult<Product> {
    self
      .catalog
      .get_product(product_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Product with ID {product_id} not found.")))
  }

  fn check_stock(product: &Product, requested: i32) -> AppResult<()> {
    if requested > product.stock {
      warn!(
        product_id = %product.id,
        requested,
        available = product.stock,
        "Cart quantity exceeds stock."
      );
      return Err(AppError::OutOfStock {
        product_id: product.id,
        requested,
        available: product.stock,
      });
    }
    Ok(())
  }

  /// Adds `quantity` to the line, creating it if needed.
  ///
  /// The increment and the stock bound are one backend step, so concurrent
  /// adds for the same owner all land.
  #[instrument(name = "cart::add_line", skip(self, owner), fields(owner = %owner))]
  pub async fn add_line(&self, owner: &OwnerKey, product_id: Uuid, quantity: i32) -> AppResult<CartLine> {
    if quantity < 1 {
      return Err(AppError::Validation("Quantity must be a positive number.".to_string()));
    }
    let product = self.product(product_id).await?;
    let backend = self.backend(owner);
    let key = owner.as_key();
    let mut requested = quantity;
    // A second try covers a line that shrank between the refusal and the re-read.
    for _ in 0..2 {
      if let Some(line) = backend.increment_line(&key, product_id, quantity, product.stock).await? {
        info!(quantity = line.quantity, "Cart line added.");
        return Ok(line);
      }
      let existing = backend
        .cart_lines(&key)
        .await?
        .into_iter()
        .find(|l| l.product_id == product_id)
        .map_or(0, |l| l.quantity);
      requested = existing
        .checked_add(quantity)
        .ok_or_else(|| AppError::Validation("Quantity is too large.".to_string()))?;
      Self::check_stock(&product, requested)?;
    }
    Err(AppError::OutOfStock {
      product_id,
      requested,
      available: product.stock,
    })
  }

  /// Sets the line to `quantity`. Zero removes it and returns `None`.
  #[instrument(name = "cart::update_line", skip(self, owner), fields(owner = %owner))]
  pub async fn update_line(&self, owner: &OwnerKey, product_id: Uuid, quantity: i32) -> AppResult<Option<CartLine>> {
    if quantity < 0 {
      return Err(AppError::Validation("Quantity must not be negative.".to_string()));
    }
    if quantity == 0 {
      self.remove_line(owner, product_id).await?;
      return Ok(None);
    }
    let product = self.product(product_id).await?;
    Self::check_stock(&product, quantity)?;
    let line = self.backend(owner).upsert_line(&owner.as_key(), product_id, quantity).await?;
    Ok(Some(line))
  }

  #[instrument(name = "cart::remove_line", skip(self, owner), fields(owner = %owner))]
  pub async fn remove_line(&self, owner: &OwnerKey, product_id: Uuid) -> AppResult<bool> {
    self.backend(owner).remove_line(&owner.as_key(), product_id).await
  }

  pub async fn clear(&self, owner: &OwnerKey) -> AppResult<u64> {
    self.backend(owner).clear_cart(&owner.as_key()).await
  }

  pub async fn lines(&self, owner: &OwnerKey) -> AppResult<Vec<CartLine>> {
    self.backend(owner).cart_lines(&owner.as_key()).await
  }

  /// The cart joined with current catalog prices and names.
  pub async fn get_cart(&self, owner: &OwnerKey) -> AppResult<Vec<CartViewLine>> {
    let lines = self.lines(owner).await?;
    if lines.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, Product> = self
      .catalog
      .products_by_ids(&ids)
      .await?
      .into_iter()
      .map(|p| (p.id, p))
      .collect();

    let mut view = Vec::with_capacity(lines.len());
    for line in lines {
      let Some(product) = products.get(&line.product_id) else {
        warn!(product_id = %line.product_id, "Cart line refers to a product that no longer exists.");
        continue;
      };
      view.push(CartViewLine {
        product_id: product.id,
        product_name: product.name.clone(),
        unit_price: product.price,
        weight_grams: product.weight_grams,
        quantity: line.quantity,
        line_total: product.price.saturating_mul(i64::from(line.quantity)),
      });
    }
    Ok(view)
  }

  /// Drops guest carts nobody has written to since `cutoff`.
  pub async fn purge_idle_guest_carts(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
    self.ephemeral.purge_idle_carts(cutoff).await
  }

  /// Folds a guest cart into the user's cart once per guest token.
  ///
  /// `guest_lines` defaults to the ephemeral cart held for `guest_token`.
  #[instrument(name = "cart::merge_guest_into_user", skip(self, guest_lines), fields(user_id = %user_id))]
  pub async fn merge_guest_into_user(
    &self,
    user_id: Uuid,
    guest_token: &str,
    guest_lines: Option<Vec<LineInput>>,
  ) -> AppResult<MergeOutcome> {
    if guest_token.trim().is_empty() {
      return Err(AppError::Validation("guestToken must not be empty.".to_string()));
    }
    let guest = OwnerKey::Guest(guest_token.to_string());
    let guest_lines = match guest_lines {
      Some(lines) => lines,
      None => self
        .ephemeral
        .cart_lines(&guest.as_key())
        .await?
        .into_iter()
        .map(|l| LineInput {
          product_id: l.product_id,
          quantity: l.quantity,
        })
        .collect(),
    };

    let user_key = OwnerKey::User(user_id).as_key();
    let merged = self.durable.merge_guest_lines(&user_key, guest_token, &guest_lines).await?;
    match merged {
      Some(adjustments) => {
        self.ephemeral.clear_cart(&guest.as_key()).await?;
        info!(adjustments = adjustments.len(), "Guest cart merged.");
        Ok(MergeOutcome {
          adjustments,
          already_merged: false,
        })
      }
      None => {
        info!("Guest token already consumed; cart left unchanged.");
        Ok(MergeOutcome {
          adjustments: Vec::new(),
          already_merged: true,
        })
      }
    }
  }
}
