// storefront/src/store/postgres.rs

//! PostgreSQL datastore.
//!
//! Stock and seat counters only change through conditional `UPDATE`s; compound
//! operations run in one transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
  AttemptClaim, CartMerger, CartRepository, CatalogStore, GuestCartRepository, LedgerStore, OrderStore,
  OrderTransition, PaymentAttemptStore, RegistrationStore,
};
use crate::errors::{AppError, Result as AppResult};
use crate::models::cart_line::LineInput;
use crate::models::{
  AttemptOutcome, AttemptTarget, CartLine, NewPaymentAttempt, Order, OrderDraft, OrderItem, OrderStatus,
  PaymentAttempt, Product, Registration, RegistrationDraft, Reservation, ReservationState, StoreSettings,
  WorkshopSession,
};
use crate::services::cart::{plan_merge, MergeAdjustment};

const USER_CARTS: &str = "cart_lines";
const GUEST_CARTS: &str = "guest_cart_lines";
const CART_LINE_COLUMNS: &str = "owner_key, product_id, quantity, added_at";

const PRODUCT_COLUMNS: &str = "id, name, description, price, weight_grams, stock, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, workshop_id, title, starts_at, price, seats_total, seats_booked";
const ORDER_COLUMNS: &str = "id, owner_key, status, subtotal, tax, shipping_cost, total, currency, \
                             gateway_order_id, payment_id, created_at, updated_at";
const RESERVATION_COLUMNS: &str = "id, order_id, product_id, quantity, state, created_at, updated_at";
const REGISTRATION_COLUMNS: &str = "id, session_id, customer_name, customer_email, customer_phone, amount_paid, \
                                    payment_status, gateway_order_id, payment_id, created_at, updated_at";
const ATTEMPT_COLUMNS: &str = "gateway_order_id, gateway_payment_id, signature, order_id, registration_id, outcome, \
                               created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub const fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> AppResult<Self> {
    let pool = PgPool::connect(database_url).await?;
    info!("Successfully connected to the database.");
    Ok(Self::new(pool))
  }

  pub async fn migrate(&self) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    info!("Database migrations applied.");
    Ok(())
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

/// Moves one reservation and hands its units back to stock if the target state does.
async fn move_reservation(
  conn: &mut PgConnection,
  reservation_id: Uuid,
  from: ReservationState,
  to: ReservationState,
) -> Result<bool, sqlx::Error> {
  if !from.can_transition_to(to) {
    return Ok(false);
  }
  let moved: Option<(Uuid, i32)> = sqlx::query_as(
    "UPDATE stock_reservations SET state = $3, updated_at = now() \
     WHERE id = $1 AND state = $2 RETURNING product_id, quantity",
  )
  .bind(reservation_id)
  .bind(from)
  .bind(to)
  .fetch_optional(&mut *conn)
  .await?;

  let Some((product_id, quantity)) = moved else {
    return Ok(false);
  };
  if to.returns_stock() {
    return_stock(conn, product_id, quantity).await?;
  }
  Ok(true)
}

async fn settle_order(
  conn: &mut PgConnection,
  order_id: Uuid,
  from: ReservationState,
  to: ReservationState,
) -> Result<u64, sqlx::Error> {
  if !from.can_transition_to(to) {
    return Ok(0);
  }
  let moved: Vec<(Uuid, i32)> = sqlx::query_as(
    "UPDATE stock_reservations SET state = $3, updated_at = now() \
     WHERE order_id = $1 AND state = $2 RETURNING product_id, quantity",
  )
  .bind(order_id)
  .bind(from)
  .bind(to)
  .fetch_all(&mut *conn)
  .await?;

  if to.returns_stock() {
    for (product_id, quantity) in &moved {
      return_stock(conn, *product_id, *quantity).await?;
    }
  }
  Ok(moved.len() as u64)
}

async fn return_stock(conn: &mut PgConnection, product_id: Uuid, quantity: i32) -> Result<(), sqlx::Error> {
  sqlx::query("UPDATE products SET stock = stock + $1, updated_at = now() WHERE id = $2")
    .bind(quantity)
    .bind(product_id)
    .execute(conn)
    .await?;
  Ok(())
}

/// `stock = stock - quantity WHERE stock >= quantity`; `OutOfStock` when the guard fails.
async fn take_stock(conn: &mut PgConnection, product_id: Uuid, quantity: i32) -> AppResult<()> {
  let taken = sqlx::query("UPDATE products SET stock = stock - $1, updated_at = now() WHERE id = $2 AND stock >= $1")
    .bind(quantity)
    .bind(product_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
  if taken == 1 {
    return Ok(());
  }
  let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;
  Err(AppError::OutOfStock {
    product_id,
    requested: quantity,
    available: available.unwrap_or(0),
  })
}

async fn insert_reservation(
  conn: &mut PgConnection,
  order_id: Option<Uuid>,
  product_id: Uuid,
  quantity: i32,
) -> Result<Reservation, sqlx::Error> {
  sqlx::query_as(&format!(
    "INSERT INTO stock_reservations (id, order_id, product_id, quantity) VALUES ($1, $2, $3, $4) \
     RETURNING {RESERVATION_COLUMNS}"
  ))
  .bind(Uuid::new_v4())
  .bind(order_id)
  .bind(product_id)
  .bind(quantity)
  .fetch_one(conn)
  .await
}

async fn lines_in(pool: &PgPool, table: &str, owner_key: &str) -> AppResult<Vec<CartLine>> {
  let lines = sqlx::query_as(&format!(
    "SELECT {CART_LINE_COLUMNS} FROM {table} WHERE owner_key = $1 ORDER BY added_at"
  ))
  .bind(owner_key)
  .fetch_all(pool)
  .await?;
  Ok(lines)
}

async fn set_line_in(
  pool: &PgPool,
  table: &str,
  owner_key: &str,
  product_id: Uuid,
  quantity: i32,
) -> AppResult<CartLine> {
  let line = sqlx::query_as(&format!(
    "INSERT INTO {table} (owner_key, product_id, quantity) VALUES ($1, $2, $3) \
     ON CONFLICT (owner_key, product_id) DO UPDATE SET quantity = EXCLUDED.quantity, touched_at = now() \
     RETURNING {CART_LINE_COLUMNS}"
  ))
  .bind(owner_key)
  .bind(product_id)
  .bind(quantity)
  .fetch_one(pool)
  .await?;
  Ok(line)
}

/// `quantity = quantity + $3 WHERE quantity <= $4 - $3`, inserting the line if absent.
async fn increment_line_in(
  pool: &PgPool,
  table: &str,
  owner_key: &str,
  product_id: Uuid,
  quantity: i32,
  limit: i32,
) -> AppResult<Option<CartLine>> {
  if quantity > limit {
    return Ok(None);
  }
  let line = sqlx::query_as(&format!(
    "INSERT INTO {table} (owner_key, product_id, quantity) VALUES ($1, $2, $3) \
     ON CONFLICT (owner_key, product_id) DO UPDATE \
     SET quantity = {table}.quantity + EXCLUDED.quantity, touched_at = now() \
     WHERE {table}.quantity <= $4 - EXCLUDED.quantity \
     RETURNING {CART_LINE_COLUMNS}"
  ))
  .bind(owner_key)
  .bind(product_id)
  .bind(quantity)
  .bind(limit)
  .fetch_optional(pool)
  .await?;
  Ok(line)
}

async fn remove_line_in(pool: &PgPool, table: &str, owner_key: &str, product_id: Uuid) -> AppResult<bool> {
  let removed = sqlx::query(&format!("DELETE FROM {table} WHERE owner_key = $1 AND product_id = $2"))
    .bind(owner_key)
    .bind(product_id)
    .execute(pool)
    .await?
    .rows_affected();
  Ok(removed > 0)
}

async fn clear_in(pool: &PgPool, table: &str, owner_key: &str) -> AppResult<u64> {
  let removed = sqlx::query(&format!("DELETE FROM {table} WHERE owner_key = $1"))
    .bind(owner_key)
    .execute(pool)
    .await?
    .rows_affected();
  Ok(removed)
}

#[async_trait]
impl CatalogStore for PgStore {
  async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
    let product = sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(product)
  }

  async fn list_products(&self) -> AppResult<Vec<Product>> {
    let products = sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name ASC"))
      .fetch_all(&self.pool)
      .await?;
    Ok(products)
  }

  async fn products_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Product>> {
    let products = sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
      .bind(ids)
      .fetch_all(&self.pool)
      .await?;
    Ok(products)
  }

  async fn upsert_product(&self, product: &Product) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO products (id, name, description, price, weight_grams, stock, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
       ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description, \
       price = EXCLUDED.price, weight_grams = EXCLUDED.weight_grams, updated_at = now()",
    )
    .bind(product.id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.weight_grams)
    .bind(product.stock)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn get_session(&self, id: Uuid) -> AppResult<Option<WorkshopSession>> {
    let session = sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM workshop_sessions WHERE id = $1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(session)
  }

  async fn upsert_session(&self, session: &WorkshopSession) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO workshop_sessions (id, workshop_id, title, starts_at, price, seats_total, seats_booked) \
       VALUES ($1, $2, $3, $4, $5, $6, $7) \
       ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, starts_at = EXCLUDED.starts_at, \
       price = EXCLUDED.price, seats_total = EXCLUDED.seats_total",
    )
    .bind(session.id)
    .bind(session.workshop_id)
    .bind(&session.title)
    .bind(session.starts_at)
    .bind(session.price)
    .bind(session.seats_total)
    .bind(session.seats_booked)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn store_settings(&self) -> AppResult<Option<StoreSettings>> {
    let settings = sqlx::query_as(
      "SELECT shipping_base_rate, shipping_per_kg_rate, free_shipping_threshold, gst_percent FROM store_settings",
    )
    .fetch_optional(&self.pool)
    .await?;
    Ok(settings)
  }

  async fn save_store_settings(&self, settings: &StoreSettings) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO store_settings (id, shipping_base_rate, shipping_per_kg_rate, free_shipping_threshold, gst_percent) \
       VALUES (TRUE, $1, $2, $3, $4) \
       ON CONFLICT (id) DO UPDATE SET shipping_base_rate = EXCLUDED.shipping_base_rate, \
       shipping_per_kg_rate = EXCLUDED.shipping_per_kg_rate, \
       free_shipping_threshold = EXCLUDED.free_shipping_threshold, gst_percent = EXCLUDED.gst_percent",
    )
    .bind(settings.shipping_base_rate)
    .bind(settings.shipping_per_kg_rate)
    .bind(settings.free_shipping_threshold)
    .bind(settings.gst_percent)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

#[async_trait]
impl CartRepository for PgStore {
  async fn cart_lines(&self, owner_key: &str) -> AppResult<Vec<CartLine>> {
    lines_in(&self.pool, USER_CARTS, owner_key).await
  }

  async fn upsert_line(&self, owner_key: &str, product_id: Uuid, quantity: i32) -> AppResult<CartLine> {
    set_line_in(&self.pool, USER_CARTS, owner_key, product_id, quantity).await
  }

  async fn increment_line(
    &self,
    owner_key: &str,
    product_id: Uuid,
    quantity: i32,
    limit: i32,
  ) -> AppResult<Option<CartLine>> {
    increment_line_in(&self.pool, USER_CARTS, owner_key, product_id, quantity, limit).await
  }

  async fn remove_line(&self, owner_key: &str, product_id: Uuid) -> AppResult<bool> {
    remove_line_in(&self.pool, USER_CARTS, owner_key, product_id).await
  }

  async fn clear_cart(&self, owner_key: &str) -> AppResult<u64> {
    clear_in(&self.pool, USER_CARTS, owner_key).await
  }
}

#[async_trait]
impl CartMerger for PgStore {
  #[instrument(name = "PgStore::merge_guest_lines", skip(self, guest_lines), err)]
  async fn merge_guest_lines(
    &self,
    user_key: &str,
    guest_token: &str,
    guest_lines: &[LineInput],
  ) -> AppResult<Option<Vec<MergeAdjustment>>> {
    let mut tx = self.pool.begin().await?;

    // Serialises merges for the same user.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
      .bind(user_key)
      .execute(&mut *tx)
      .await?;

    let consumed = sqlx::query(
      "INSERT INTO cart_merges (guest_token, user_key) VALUES ($1, $2) ON CONFLICT (guest_token) DO NOTHING",
    )
    .bind(guest_token)
    .bind(user_key)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if consumed == 0 {
      tx.rollback().await?;
      return Ok(None);
    }

    let user_lines: Vec<CartLine> = sqlx::query_as(
      "SELECT owner_key, product_id, quantity, added_at FROM cart_lines WHERE owner_key = $1 FOR UPDATE",
    )
    .bind(user_key)
    .fetch_all(&mut *tx)
    .await?;

    let ids: Vec<Uuid> = guest_lines.iter().map(|l| l.product_id).collect();
    let stock: HashMap<Uuid, i32> = sqlx::query_as::<_, (Uuid, i32)>("SELECT id, stock FROM products WHERE id = ANY($1)")
      .bind(&ids)
      .fetch_all(&mut *tx)
      .await?
      .into_iter()
      .collect();

    let plan = plan_merge(&user_lines, guest_lines, &stock);
    for (product_id, quantity) in &plan.writes {
      if *quantity == 0 {
        sqlx::query("DELETE FROM cart_lines WHERE owner_key = $1 AND product_id = $2")
          .bind(user_key)
          .bind(product_id)
          .execute(&mut *tx)
          .await?;
      } else {
        sqlx::query(
          "INSERT INTO cart_lines (owner_key, product_id, quantity) VALUES ($1, $2, $3) \
           ON CONFLICT (owner_key, product_id) DO UPDATE SET quantity = EXCLUDED.quantity, touched_at = now()",
        )
        .bind(user_key)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
      }
    }

    tx.commit().await?;
    Ok(Some(plan.adjustments))
  }
}

#[async_trait]
impl LedgerStore for PgStore {
  async fn reserve_stock(&self, order_id: Option<Uuid>, product_id: Uuid, quantity: i32) -> AppResult<Reservation> {
    let mut tx = self.pool.begin().await?;
    take_stock(&mut tx, product_id, quantity).await?;
    let reservation = insert_reservation(&mut tx, order_id, product_id, quantity).await?;
    tx.commit().await?;
    Ok(reservation)
  }

  async fn transition_reservation(
    &self,
    reservation_id: Uuid,
    from: ReservationState,
    to: ReservationState,
  ) -> AppResult<bool> {
    let mut tx = self.pool.begin().await?;
    let moved = move_reservation(&mut tx, reservation_id, from, to).await?;
    tx.commit().await?;
    Ok(moved)
  }

  async fn settle_order_reservations(
    &self,
    order_id: Uuid,
    from: ReservationState,
    to: ReservationState,
  ) -> AppResult<u64> {
    let mut tx = self.pool.begin().await?;
    let moved = settle_order(&mut tx, order_id, from, to).await?;
    tx.commit().await?;
    Ok(moved)
  }

  async fn get_reservation(&self, reservation_id: Uuid) -> AppResult<Option<Reservation>> {
    let reservation = sqlx::query_as(&format!("SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE id = $1"))
      .bind(reservation_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(reservation)
  }

  async fn order_reservations(&self, order_id: Uuid) -> AppResult<Vec<Reservation>> {
    let reservations = sqlx::query_as(&format!(
      "SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE order_id = $1 ORDER BY created_at"
    ))
    .bind(order_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(reservations)
  }
}

#[async_trait]
impl OrderStore for PgStore {
  #[instrument(name = "PgStore::create_pending_order", skip(self, draft), fields(order_id = %draft.id), err)]
  async fn create_pending_order(&self, draft: &OrderDraft) -> AppResult<Order> {
    let mut tx = self.pool.begin().await?;

    let order: Order = sqlx::query_as(&format!(
      "INSERT INTO orders (id, owner_key, status, subtotal, tax, shipping_cost, total, currency) \
       VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7) RETURNING {ORDER_COLUMNS}"
    ))
    .bind(draft.id)
    .bind(&draft.owner_key)
    .bind(draft.totals.subtotal)
    .bind(draft.totals.tax)
    .bind(draft.totals.shipping_cost)
    .bind(draft.totals.total)
    .bind(&draft.currency)
    .fetch_one(&mut *tx)
    .await?;

    for item in &draft.items {
      // Dropping `tx` on the error path rolls back every earlier reservation.
      take_stock(&mut tx, item.product_id, item.quantity).await?;
      insert_reservation(&mut tx, Some(draft.id), item.product_id, item.quantity).await?;
      sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, product_name, unit_price, quantity) \
         VALUES ($1, $2, $3, $4, $5, $6)",
      )
      .bind(item.id)
      .bind(draft.id)
      .bind(item.product_id)
      .bind(&item.product_name)
      .bind(item.unit_price)
      .bind(item.quantity)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(order)
  }

  async fn get_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
    let order = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(order)
  }

  async fn order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    let items = sqlx::query_as(
      "SELECT id, order_id, product_id, product_name, unit_price, quantity FROM order_items WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(items)
  }

  async fn bind_order_gateway(&self, order_id: Uuid, gateway_order_id: &str) -> AppResult<bool> {
    let bound = sqlx::query(
      "UPDATE orders SET gateway_order_id = $2, updated_at = now() WHERE id = $1 AND status = 'pending'",
    )
    .bind(order_id)
    .bind(gateway_order_id)
    .execute(&self.pool)
    .await?
    .rows_affected();
    Ok(bound == 1)
  }

  async fn transition_order(&self, transition: &OrderTransition<'_>) -> AppResult<bool> {
    let mut tx = self.pool.begin().await?;
    let applied = sqlx::query(
      "UPDATE orders SET status = $3, payment_id = COALESCE($4, payment_id), updated_at = now() \
       WHERE id = $1 AND status = $2",
    )
    .bind(transition.order_id)
    .bind(transition.from)
    .bind(transition.to)
    .bind(transition.payment_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if applied == 0 {
      tx.rollback().await?;
      return Ok(false);
    }
    if let Some((from, to)) = transition.settle {
      settle_order(&mut tx, transition.order_id, from, to).await?;
    }
    tx.commit().await?;
    Ok(true)
  }

  async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar("SELECT id FROM orders WHERE status = $1 AND created_at < $2")
      .bind(OrderStatus::Pending)
      .bind(cutoff)
      .fetch_all(&self.pool)
      .await?;
    Ok(ids)
  }
}

#[async_trait]
impl RegistrationStore for PgStore {
  #[instrument(name = "PgStore::reserve_seat", skip(self, draft), fields(session_id = %draft.session_id), err)]
  async fn reserve_seat(&self, draft: &RegistrationDraft) -> AppResult<Registration> {
    let mut tx = self.pool.begin().await?;

    let price: Option<i64> = sqlx::query_scalar(
      "UPDATE workshop_sessions SET seats_booked = seats_booked + 1 \
       WHERE id = $1 AND seats_booked < seats_total RETURNING price",
    )
    .bind(draft.session_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(price) = price else {
      let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM workshop_sessions WHERE id = $1")
        .bind(draft.session_id)
        .fetch_optional(&mut *tx)
        .await?;
      tx.rollback().await?;
      return Err(match exists {
        Some(_) => AppError::SessionFull {
          session_id: draft.session_id,
        },
        None => AppError::NotFound(format!("Workshop session {} not found.", draft.session_id)),
      });
    };

    let registration = sqlx::query_as(&format!(
      "INSERT INTO workshop_registrations \
       (id, session_id, customer_name, customer_email, customer_phone, amount_paid, payment_status) \
       VALUES ($1, $2, $3, $4, $5, $6, 'pending') RETURNING {REGISTRATION_COLUMNS}"
    ))
    .bind(draft.id)
    .bind(draft.session_id)
    .bind(&draft.customer_name)
    .bind(&draft.customer_email)
    .bind(&draft.customer_phone)
    .bind(price)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(registration)
  }

  async fn get_registration(&self, registration_id: Uuid) -> AppResult<Option<Registration>> {
    let registration = sqlx::query_as(&format!(
      "SELECT {REGISTRATION_COLUMNS} FROM workshop_registrations WHERE id = $1"
    ))
    .bind(registration_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(registration)
  }

  async fn bind_registration_gateway(&self, registration_id: Uuid, gateway_order_id: &str) -> AppResult<bool> {
    let bound = sqlx::query(
      "UPDATE workshop_registrations SET gateway_order_id = $2, updated_at = now() \
       WHERE id = $1 AND payment_status = 'pending'",
    )
    .bind(registration_id)
    .bind(gateway_order_id)
    .execute(&self.pool)
    .await?
    .rows_affected();
    Ok(bound == 1)
  }

  async fn confirm_registration(&self, registration_id: Uuid, payment_id: &str) -> AppResult<bool> {
    let confirmed = sqlx::query(
      "UPDATE workshop_registrations SET payment_status = 'paid', payment_id = $2, updated_at = now() \
       WHERE id = $1 AND payment_status = 'pending'",
    )
    .bind(registration_id)
    .bind(payment_id)
    .execute(&self.pool)
    .await?
    .rows_affected();
    Ok(confirmed == 1)
  }

  async fn expire_registration(&self, registration_id: Uuid) -> AppResult<bool> {
    let released = sqlx::query(
      "WITH failed AS ( \
         UPDATE workshop_registrations SET payment_status = 'failed', updated_at = now() \
         WHERE id = $1 AND payment_status = 'pending' RETURNING session_id \
       ) \
       UPDATE workshop_sessions s SET seats_booked = s.seats_booked - 1 \
       FROM failed f WHERE s.id = f.session_id",
    )
    .bind(registration_id)
    .execute(&self.pool)
    .await?
    .rows_affected();
    Ok(released == 1)
  }

  async fn stale_pending_registrations(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar(
      "SELECT id FROM workshop_registrations WHERE payment_status = 'pending' AND created_at < $1",
    )
    .bind(cutoff)
    .fetch_all(&self.pool)
    .await?;
    Ok(ids)
  }
}

#[async_trait]
impl PaymentAttemptStore for PgStore {
  async fn claim_attempt(&self, attempt: &NewPaymentAttempt) -> AppResult<AttemptClaim> {
    let (order_id, registration_id) = match attempt.target {
      AttemptTarget::Order(id) => (Some(id), None),
      AttemptTarget::Registration(id) => (None, Some(id)),
    };
    let inserted: Option<PaymentAttempt> = sqlx::query_as(&format!(
      "INSERT INTO payment_attempts (gateway_order_id, gateway_payment_id, signature, order_id, registration_id) \
       VALUES ($1, $2, $3, $4, $5) ON CONFLICT (gateway_order_id) DO NOTHING RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(&attempt.gateway_order_id)
    .bind(&attempt.gateway_payment_id)
    .bind(&attempt.signature)
    .bind(order_id)
    .bind(registration_id)
    .fetch_optional(&self.pool)
    .await?;

    if let Some(row) = inserted {
      return Ok(AttemptClaim::Claimed(row));
    }
    let existing = self
      .get_attempt(&attempt.gateway_order_id)
      .await?
      .ok_or_else(|| AppError::Internal("payment attempt vanished after a key conflict".to_string()))?;
    Ok(AttemptClaim::Existing(existing))
  }

  async fn record_attempt_outcome(&self, gateway_order_id: &str, outcome: AttemptOutcome) -> AppResult<()> {
    sqlx::query("UPDATE payment_attempts SET outcome = $2, updated_at = now() WHERE gateway_order_id = $1")
      .bind(gateway_order_id)
      .bind(outcome)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn get_attempt(&self, gateway_order_id: &str) -> AppResult<Option<PaymentAttempt>> {
    let attempt = sqlx::query_as(&format!(
      "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE gateway_order_id = $1"
    ))
    .bind(gateway_order_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(attempt)
  }
}

/// Guest carts in their own table, so any instance can serve any guest.
#[derive(Clone)]
pub struct PgGuestCarts {
  pool: PgPool,
}

impl PgGuestCarts {
  pub const fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl CartRepository for PgGuestCarts {
  async fn cart_lines(&self, owner_key: &str) -> AppResult<Vec<CartLine>> {
    lines_in(&self.pool, GUEST_CARTS, owner_key).await
  }

  async fn upsert_line(&self, owner_key: &str, product_id: Uuid, quantity: i32) -> AppResult<CartLine> {
    set_line_in(&self.pool, GUEST_CARTS, owner_key, product_id, quantity).await
  }

  async fn increment_line(
    &self,
    owner_key: &str,
    product_id: Uuid,
    quantity: i32,
    limit: i32,
  ) -> AppResult<Option<CartLine>> {
    increment_line_in(&self.pool, GUEST_CARTS, owner_key, product_id, quantity, limit).await
  }

  async fn remove_line(&self, owner_key: &str, product_id: Uuid) -> AppResult<bool> {
    remove_line_in(&self.pool, GUEST_CARTS, owner_key, product_id).await
  }

  async fn clear_cart(&self, owner_key: &str) -> AppResult<u64> {
    clear_in(&self.pool, GUEST_CARTS, owner_key).await
  }
}

#[async_trait]
impl GuestCartRepository for PgGuestCarts {
  async fn purge_idle_carts(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
    let purged: i64 = sqlx::query_scalar(
      "WITH idle AS ( \
         SELECT owner_key FROM guest_cart_lines GROUP BY owner_key HAVING max(touched_at) < $1 \
       ), gone AS ( \
         DELETE FROM guest_cart_lines WHERE owner_key IN (SELECT owner_key FROM idle) RETURNING owner_key \
       ) \
       SELECT count(DISTINCT owner_key) FROM gone",
    )
    .bind(cutoff)
    .fetch_one(&self.pool)
    .await?;
    Ok(purged.max(0) as u64)
  }
}
