// storefront/src/store/memory.rs

//! In-process datastore.
//!
//! All tables sit behind one `parking_lot::Mutex`, so every trait method is a
//! single critical section and the guarded updates are as atomic as their SQL
//! counterparts. Used by tests, local development, and as the ephemeral
//! guest-cart backend.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
  AttemptClaim, CartMerger, CartRepository, CatalogStore, GuestCartRepository, LedgerStore, OrderStore,
  OrderTransition, PaymentAttemptStore, RegistrationStore,
};
use crate::errors::{AppError, Result as AppResult};
use crate::models::cart_line::LineInput;
use crate::models::{
  AttemptOutcome, AttemptTarget, CartLine, NewPaymentAttempt, Order, OrderDraft, OrderItem, OrderStatus,
  PaymentAttempt, PaymentStatus, Product, Registration, RegistrationDraft, Reservation, ReservationState,
  StoreSettings, WorkshopSession,
};
use crate::services::cart::{plan_merge, MergeAdjustment};

#[derive(Default)]
struct Tables {
  products: HashMap<Uuid, Product>,
  sessions: HashMap<Uuid, WorkshopSession>,
  settings: Option<StoreSettings>,
  carts: HashMap<String, BTreeMap<Uuid, CartLine>>,
  cart_touched: HashMap<String, DateTime<Utc>>,
  consumed_guest_tokens: HashSet<String>,
  reservations: HashMap<Uuid, Reservation>,
  orders: HashMap<Uuid, Order>,
  order_items: HashMap<Uuid, Vec<OrderItem>>,
  registrations: HashMap<Uuid, Registration>,
  attempts: HashMap<String, PaymentAttempt>,
}

impl Tables {
  fn touch_cart(&mut self, owner_key: &str) {
    self.cart_touched.insert(owner_key.to_string(), Utc::now());
  }

  fn drop_cart(&mut self, owner_key: &str) -> usize {
    self.cart_touched.remove(owner_key);
    self.carts.remove(owner_key).map_or(0, |cart| cart.len())
  }

  fn take_stock(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()> {
    let product = self
      .products
      .get_mut(&product_id)
      .ok_or_else(|| AppError::NotFound(format!("Product with ID {product_id} not found.")))?;
    if product.stock < quantity {
      return Err(AppError::OutOfStock {
        product_id,
        requested: quantity,
        available: product.stock,
      });
    }
    product.stock -= quantity;
    product.updated_at = Utc::now();
    Ok(())
  }

  fn return_stock(&mut self, product_id: Uuid, quantity: i32) {
    if let Some(product) = self.products.get_mut(&product_id) {
      product.stock += quantity;
      product.updated_at = Utc::now();
    }
  }

  fn move_reservation(&mut self, reservation_id: Uuid, from: ReservationState, to: ReservationState) -> bool {
    let Some(reservation) = self.reservations.get_mut(&reservation_id) else {
      return false;
    };
    if reservation.state != from || !from.can_transition_to(to) {
      return false;
    }
    reservation.state = to;
    reservation.updated_at = Utc::now();
    let (product_id, quantity) = (reservation.product_id, reservation.quantity);
    if to.returns_stock() {
      self.return_stock(product_id, quantity);
    }
    true
  }

  fn settle_order(&mut self, order_id: Uuid, from: ReservationState, to: ReservationState) -> u64 {
    let ids: Vec<Uuid> = self
      .reservations
      .values()
      .filter(|r| r.order_id == Some(order_id) && r.state == from)
      .map(|r| r.id)
      .collect();
    ids.into_iter().filter(|id| self.move_reservation(*id, from, to)).count() as u64
  }

  fn new_reservation(&mut self, order_id: Option<Uuid>, product_id: Uuid, quantity: i32) -> Reservation {
    let now = Utc::now();
    let reservation = Reservation {
      id: Uuid::new_v4(),
      order_id,
      product_id,
      quantity,
      state: ReservationState::Held,
      created_at: now,
      updated_at: now,
    };
    self.reservations.insert(reservation.id, reservation.clone());
    reservation
  }
}

#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CatalogStore for MemoryStore {
  async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
    Ok(self.tables.lock().products.get(&id).cloned())
  }

  async fn list_products(&self) -> AppResult<Vec<Product>> {
    let mut products: Vec<Product> = self.tables.lock().products.values().cloned().collect();
    products.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(products)
  }

  async fn products_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Product>> {
    let tables = self.tables.lock();
    Ok(ids.iter().filter_map(|id| tables.products.get(id).cloned()).collect())
  }

  async fn upsert_product(&self, product: &Product) -> AppResult<()> {
    if product.stock < 0 {
      return Err(AppError::Validation("stock must not be negative".to_string()));
    }
    let mut tables = self.tables.lock();
    match tables.products.get_mut(&product.id) {
      Some(existing) => {
        existing.name = product.name.clone();
        existing.description = product.description.clone();
        existing.price = product.price;
        existing.weight_grams = product.weight_grams;
        existing.updated_at = Utc::now();
      }
      None => {
        tables.products.insert(product.id, product.clone());
      }
    }
    Ok(())
  }

  async fn get_session(&self, id: Uuid) -> AppResult<Option<WorkshopSession>> {
    Ok(self.tables.lock().sessions.get(&id).cloned())
  }

  async fn upsert_session(&self, session: &WorkshopSession) -> AppResult<()> {
    if session.seats_booked < 0 || session.seats_booked > session.seats_total {
      return Err(AppError::Validation("seats_booked must lie within 0..=seats_total".to_string()));
    }
    let mut tables = self.tables.lock();
    match tables.sessions.get_mut(&session.id) {
      Some(existing) => {
        if session.seats_total < existing.seats_booked {
          return Err(AppError::Validation(format!(
            "session {} already has {} seats booked",
            session.id, existing.seats_booked
          )));
        }
        existing.title = session.title.clone();
        existing.starts_at = session.starts_at;
        existing.price = session.price;
        existing.seats_total = session.seats_total;
      }
      None => {
        tables.sessions.insert(session.id, session.clone());
      }
    }
    Ok(())
  }

  async fn store_settings(&self) -> AppResult<Option<StoreSettings>> {
    Ok(self.tables.lock().settings.clone())
  }

  async fn save_store_settings(&self, settings: &StoreSettings) -> AppResult<()> {
    self.tables.lock().settings = Some(settings.clone());
    Ok(())
  }
}

#[async_trait]
impl CartRepository for MemoryStore {
  async fn cart_lines(&self, owner_key: &str) -> AppResult<Vec<CartLine>> {
    let tables = self.tables.lock();
    let mut lines: Vec<CartLine> = tables
      .carts
      .get(owner_key)
      .map(|cart| cart.values().cloned().collect())
      .unwrap_or_default();
    lines.sort_by_key(|l| l.added_at);
    Ok(lines)
  }

  async fn upsert_line(&self, owner_key: &str, product_id: Uuid, quantity: i32) -> AppResult<CartLine> {
    let mut tables = self.tables.lock();
    tables.touch_cart(owner_key);
    let cart = tables.carts.entry(owner_key.to_string()).or_default();
    let line = cart.entry(product_id).or_insert_with(|| CartLine {
      owner_key: owner_key.to_string(),
      product_id,
      quantity,
      added_at: Utc::now(),
    });
    line.quantity = quantity;
    Ok(line.clone())
  }

  async fn increment_line(
    &self,
    owner_key: &str,
    product_id: Uuid,
    quantity: i32,
    limit: i32,
  ) -> AppResult<Option<CartLine>> {
    let mut tables = self.tables.lock();
    let existing = tables
      .carts
      .get(owner_key)
      .and_then(|cart| cart.get(&product_id))
      .map_or(0, |l| l.quantity);
    match existing.checked_add(quantity) {
      Some(total) if total <= limit => {}
      _ => return Ok(None),
    }
    tables.touch_cart(owner_key);
    let cart = tables.carts.entry(owner_key.to_string()).or_default();
    let line = cart.entry(product_id).or_insert_with(|| CartLine {
      owner_key: owner_key.to_string(),
      product_id,
      quantity: 0,
      added_at: Utc::now(),
    });
    line.quantity += quantity;
    Ok(Some(line.clone()))
  }

  async fn remove_line(&self, owner_key: &str, product_id: Uuid) -> AppResult<bool> {
    let mut tables = self.tables.lock();
    let removed = tables
      .carts
      .get_mut(owner_key)
      .is_some_and(|cart| cart.remove(&product_id).is_some());
    if removed {
      tables.touch_cart(owner_key);
    }
    Ok(removed)
  }

  async fn clear_cart(&self, owner_key: &str) -> AppResult<u64> {
    Ok(self.tables.lock().drop_cart(owner_key) as u64)
  }
}

#[async_trait]
impl CartMerger for MemoryStore {
  async fn merge_guest_lines(
    &self,
    user_key: &str,
    guest_token: &str,
    guest_lines: &[LineInput],
  ) -> AppResult<Option<Vec<MergeAdjustment>>> {
    let mut tables = self.tables.lock();
    if !tables.consumed_guest_tokens.insert(guest_token.to_string()) {
      return Ok(None);
    }

    let user_lines: Vec<CartLine> = tables
      .carts
      .get(user_key)
      .map(|cart| cart.values().cloned().collect())
      .unwrap_or_default();
    let stock: HashMap<Uuid, i32> = guest_lines
      .iter()
      .filter_map(|l| tables.products.get(&l.product_id).map(|p| (p.id, p.stock)))
      .collect();
    let plan = plan_merge(&user_lines, guest_lines, &stock);

    tables.touch_cart(user_key);
    let cart = tables.carts.entry(user_key.to_string()).or_default();
    for (product_id, quantity) in plan.writes {
      if quantity == 0 {
        cart.remove(&product_id);
        continue;
      }
      cart
        .entry(product_id)
        .and_modify(|l| l.quantity = quantity)
        .or_insert_with(|| CartLine {
          owner_key: user_key.to_string(),
          product_id,
          quantity,
          added_at: Utc::now(),
        });
    }
    Ok(Some(plan.adjustments))
  }
}

#[async_trait]
impl GuestCartRepository for MemoryStore {
  async fn purge_idle_carts(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
    let mut tables = self.tables.lock();
    let idle: Vec<String> = tables
      .cart_touched
      .iter()
      .filter(|(_, touched)| **touched < cutoff)
      .map(|(owner_key, _)| owner_key.clone())
      .collect();
    let purged = idle.iter().filter(|owner_key| tables.drop_cart(owner_key) > 0).count();
    Ok(purged as u64)
  }
}

#[async_trait]
impl LedgerStore for MemoryStore {
  async fn reserve_stock(&self, order_id: Option<Uuid>, product_id: Uuid, quantity: i32) -> AppResult<Reservation> {
    let mut tables = self.tables.lock();
    tables.take_stock(product_id, quantity)?;
    Ok(tables.new_reservation(order_id, product_id, quantity))
  }

  async fn transition_reservation(
    &self,
    reservation_id: Uuid,
    from: ReservationState,
    to: ReservationState,
  ) -> AppResult<bool> {
    Ok(self.tables.lock().move_reservation(reservation_id, from, to))
  }

  async fn settle_order_reservations(
    &self,
    order_id: Uuid,
    from: ReservationState,
    to: ReservationState,
  ) -> AppResult<u64> {
    Ok(self.tables.lock().settle_order(order_id, from, to))
  }

  async fn get_reservation(&self, reservation_id: Uuid) -> AppResult<Option<Reservation>> {
    Ok(self.tables.lock().reservations.get(&reservation_id).cloned())
  }

  async fn order_reservations(&self, order_id: Uuid) -> AppResult<Vec<Reservation>> {
    let tables = self.tables.lock();
    let mut found: Vec<Reservation> = tables
      .reservations
      .values()
      .filter(|r| r.order_id == Some(order_id))
      .cloned()
      .collect();
    found.sort_by_key(|r| r.created_at);
    Ok(found)
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn create_pending_order(&self, draft: &OrderDraft) -> AppResult<Order> {
    let mut tables = self.tables.lock();

    // Check every line before touching stock so a failure leaves nothing behind.
    for item in &draft.items {
      let available = tables.products.get(&item.product_id).map_or(0, |p| p.stock);
      if available < item.quantity {
        return Err(AppError::OutOfStock {
          product_id: item.product_id,
          requested: item.quantity,
          available,
        });
      }
    }
    for item in &draft.items {
      tables.take_stock(item.product_id, item.quantity)?;
      tables.new_reservation(Some(draft.id), item.product_id, item.quantity);
    }

    let now = Utc::now();
    let order = Order {
      id: draft.id,
      owner_key: draft.owner_key.clone(),
      status: OrderStatus::Pending,
      subtotal: draft.totals.subtotal,
      tax: draft.totals.tax,
      shipping_cost: draft.totals.shipping_cost,
      total: draft.totals.total,
      currency: draft.currency.clone(),
      gateway_order_id: None,
      payment_id: None,
      created_at: now,
      updated_at: now,
    };
    tables.orders.insert(order.id, order.clone());
    tables.order_items.insert(order.id, draft.items.clone());
    Ok(order)
  }

  async fn get_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
    Ok(self.tables.lock().orders.get(&order_id).cloned())
  }

  async fn order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    Ok(self.tables.lock().order_items.get(&order_id).cloned().unwrap_or_default())
  }

  async fn bind_order_gateway(&self, order_id: Uuid, gateway_order_id: &str) -> AppResult<bool> {
    let mut tables = self.tables.lock();
    match tables.orders.get_mut(&order_id) {
      Some(order) if order.status == OrderStatus::Pending => {
        order.gateway_order_id = Some(gateway_order_id.to_string());
        order.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn transition_order(&self, transition: &OrderTransition<'_>) -> AppResult<bool> {
    let mut tables = self.tables.lock();
    let Some(order) = tables.orders.get_mut(&transition.order_id) else {
      return Ok(false);
    };
    if order.status != transition.from {
      return Ok(false);
    }
    order.status = transition.to;
    order.updated_at = Utc::now();
    if let Some(payment_id) = transition.payment_id {
      order.payment_id = Some(payment_id.to_string());
    }
    if let Some((from, to)) = transition.settle {
      tables.settle_order(transition.order_id, from, to);
    }
    Ok(true)
  }

  async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
    let tables = self.tables.lock();
    Ok(
      tables
        .orders
        .values()
        .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
        .map(|o| o.id)
        .collect(),
    )
  }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
  async fn reserve_seat(&self, draft: &RegistrationDraft) -> AppResult<Registration> {
    let mut tables = self.tables.lock();
    let session = tables
      .sessions
      .get_mut(&draft.session_id)
      .ok_or_else(|| AppError::NotFound(format!("Workshop session {} not found.", draft.session_id)))?;
    if session.seats_booked >= session.seats_total {
      return Err(AppError::SessionFull {
        session_id: draft.session_id,
      });
    }
    session.seats_booked += 1;
    let amount = session.price;

    let now = Utc::now();
    let registration = Registration {
      id: draft.id,
      session_id: draft.session_id,
      customer_name: draft.customer_name.clone(),
      customer_email: draft.customer_email.clone(),
      customer_phone: draft.customer_phone.clone(),
      amount_paid: amount,
      payment_status: PaymentStatus::Pending,
      gateway_order_id: None,
      payment_id: None,
      created_at: now,
      updated_at: now,
    };
    tables.registrations.insert(registration.id, registration.clone());
    Ok(registration)
  }

  async fn get_registration(&self, registration_id: Uuid) -> AppResult<Option<Registration>> {
    Ok(self.tables.lock().registrations.get(&registration_id).cloned())
  }

  async fn bind_registration_gateway(&self, registration_id: Uuid, gateway_order_id: &str) -> AppResult<bool> {
    let mut tables = self.tables.lock();
    match tables.registrations.get_mut(&registration_id) {
      Some(reg) if reg.payment_status == PaymentStatus::Pending => {
        reg.gateway_order_id = Some(gateway_order_id.to_string());
        reg.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn confirm_registration(&self, registration_id: Uuid, payment_id: &str) -> AppResult<bool> {
    let mut tables = self.tables.lock();
    match tables.registrations.get_mut(&registration_id) {
      Some(reg) if reg.payment_status == PaymentStatus::Pending => {
        reg.payment_status = PaymentStatus::Paid;
        reg.payment_id = Some(payment_id.to_string());
        reg.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn expire_registration(&self, registration_id: Uuid) -> AppResult<bool> {
    let mut tables = self.tables.lock();
    let session_id = match tables.registrations.get_mut(&registration_id) {
      Some(reg) if reg.payment_status == PaymentStatus::Pending => {
        reg.payment_status = PaymentStatus::Failed;
        reg.updated_at = Utc::now();
        reg.session_id
      }
      _ => return Ok(false),
    };
    if let Some(session) = tables.sessions.get_mut(&session_id) {
      session.seats_booked = (session.seats_booked - 1).max(0);
    }
    Ok(true)
  }

  async fn stale_pending_registrations(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
    let tables = self.tables.lock();
    Ok(
      tables
        .registrations
        .values()
        .filter(|r| r.payment_status == PaymentStatus::Pending && r.created_at < cutoff)
        .map(|r| r.id)
        .collect(),
    )
  }
}

#[async_trait]
impl PaymentAttemptStore for MemoryStore {
  async fn claim_attempt(&self, attempt: &NewPaymentAttempt) -> AppResult<AttemptClaim> {
    let mut tables = self.tables.lock();
    if let Some(existing) = tables.attempts.get(&attempt.gateway_order_id) {
      return Ok(AttemptClaim::Existing(existing.clone()));
    }
    let (order_id, registration_id) = match attempt.target {
      AttemptTarget::Order(id) => (Some(id), None),
      AttemptTarget::Registration(id) => (None, Some(id)),
    };
    let now = Utc::now();
    let row = PaymentAttempt {
      gateway_order_id: attempt.gateway_order_id.clone(),
      gateway_payment_id: attempt.gateway_payment_id.clone(),
      signature: attempt.signature.clone(),
      order_id,
      registration_id,
      outcome: AttemptOutcome::Pending,
      created_at: now,
      updated_at: now,
    };
    tables.attempts.insert(row.gateway_order_id.clone(), row.clone());
    Ok(AttemptClaim::Claimed(row))
  }

  async fn record_attempt_outcome(&self, gateway_order_id: &str, outcome: AttemptOutcome) -> AppResult<()> {
    if let Some(attempt) = self.tables.lock().attempts.get_mut(gateway_order_id) {
      attempt.outcome = outcome;
      attempt.updated_at = Utc::now();
    }
    Ok(())
  }

  async fn get_attempt(&self, gateway_order_id: &str) -> AppResult<Option<PaymentAttempt>> {
    Ok(self.tables.lock().attempts.get(gateway_order_id).cloned())
  }
}
