// storefront/src/store/mod.rs

//! Datastore capabilities and their two backends.
//!
//! Every method that moves stock, seats or a status is a single guarded
//! operation: it either applies completely or reports that the guard did not
//! hold. Callers never read-then-write.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::Result as AppResult;
use crate::models::{
  CartLine, NewPaymentAttempt, Order, OrderDraft, OrderItem, OrderStatus, PaymentAttempt, Product, Registration,
  RegistrationDraft, Reservation, ReservationState, StoreSettings, WorkshopSession,
};
use crate::models::cart_line::LineInput;
use crate::services::cart::MergeAdjustment;

pub use memory::MemoryStore;
pub use postgres::{PgGuestCarts, PgStore};

#[async_trait]
pub trait CatalogStore: Send + Sync {
  async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>>;
  async fn list_products(&self) -> AppResult<Vec<Product>>;
  async fn products_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Product>>;
  /// Inserts a product with its opening stock. For an existing id only the
  /// catalog fields change; stock moves solely through the ledger.
  async fn upsert_product(&self, product: &Product) -> AppResult<()>;

  async fn get_session(&self, id: Uuid) -> AppResult<Option<WorkshopSession>>;
  /// Inserts a session. For an existing id `seats_booked` is left alone.
  async fn upsert_session(&self, session: &WorkshopSession) -> AppResult<()>;

  async fn store_settings(&self) -> AppResult<Option<StoreSettings>>;
  async fn save_store_settings(&self, settings: &StoreSettings) -> AppResult<()>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
  async fn cart_lines(&self, owner_key: &str) -> AppResult<Vec<CartLine>>;

  /// Sets the line's quantity, inserting it if absent. `quantity` is at least one.
  async fn upsert_line(&self, owner_key: &str, product_id: Uuid, quantity: i32) -> AppResult<CartLine>;

  /// Adds `quantity` to the line in one step, inserting it if absent.
  ///
  /// Returns `None` and leaves the line alone when the sum would exceed `limit`.
  async fn increment_line(&self, owner_key: &str, product_id: Uuid, quantity: i32, limit: i32)
    -> AppResult<Option<CartLine>>;

  async fn remove_line(&self, owner_key: &str, product_id: Uuid) -> AppResult<bool>;

  async fn clear_cart(&self, owner_key: &str) -> AppResult<u64>;
}

/// The durable cart backend, which also owns guest -> user reconciliation.
#[async_trait]
pub trait CartMerger: CartRepository {
  /// Folds `guest_lines` into the user's cart, clamping to stock.
  ///
  /// Atomic per user. Returns `None` without touching the cart when
  /// `guest_token` was already consumed.
  async fn merge_guest_lines(
    &self,
    user_key: &str,
    guest_token: &str,
    guest_lines: &[LineInput],
  ) -> AppResult<Option<Vec<MergeAdjustment>>>;
}

/// Where guest carts live. Shared by every instance when backed by Postgres.
#[async_trait]
pub trait GuestCartRepository: CartRepository {
  /// Drops every cart last written before `cutoff`. Returns how many carts went.
  async fn purge_idle_carts(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
  /// `stock = stock - quantity WHERE stock >= quantity`, recorded as a HELD reservation.
  async fn reserve_stock(&self, order_id: Option<Uuid>, product_id: Uuid, quantity: i32) -> AppResult<Reservation>;

  /// Moves one reservation `from -> to`, returning units to stock when `to` does.
  async fn transition_reservation(&self, reservation_id: Uuid, from: ReservationState, to: ReservationState)
    -> AppResult<bool>;

  /// Moves every reservation of the order that is in `from`. Returns how many moved.
  async fn settle_order_reservations(&self, order_id: Uuid, from: ReservationState, to: ReservationState)
    -> AppResult<u64>;

  async fn get_reservation(&self, reservation_id: Uuid) -> AppResult<Option<Reservation>>;
  async fn order_reservations(&self, order_id: Uuid) -> AppResult<Vec<Reservation>>;
}

/// A guarded order status change, optionally settling reservations in the same step.
#[derive(Debug, Clone)]
pub struct OrderTransition<'a> {
  pub order_id: Uuid,
  pub from: OrderStatus,
  pub to: OrderStatus,
  pub payment_id: Option<&'a str>,
  pub settle: Option<(ReservationState, ReservationState)>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Inserts a PENDING order and reserves every item, or nothing at all.
  ///
  /// Fails with `OutOfStock` naming the first item that could not be reserved.
  async fn create_pending_order(&self, draft: &OrderDraft) -> AppResult<Order>;

  async fn get_order(&self, order_id: Uuid) -> AppResult<Option<Order>>;
  async fn order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>>;

  /// Stores the gateway order id while the order is still PENDING.
  async fn bind_order_gateway(&self, order_id: Uuid, gateway_order_id: &str) -> AppResult<bool>;

  /// Applies `transition` only if the order is currently in `transition.from`.
  async fn transition_order(&self, transition: &OrderTransition<'_>) -> AppResult<bool>;

  async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>>;
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
  /// `seats_booked = seats_booked + 1 WHERE seats_booked < seats_total` plus a PENDING registration.
  async fn reserve_seat(&self, draft: &RegistrationDraft) -> AppResult<Registration>;

  async fn get_registration(&self, registration_id: Uuid) -> AppResult<Option<Registration>>;

  async fn bind_registration_gateway(&self, registration_id: Uuid, gateway_order_id: &str) -> AppResult<bool>;

  /// PENDING -> PAID.
  async fn confirm_registration(&self, registration_id: Uuid, payment_id: &str) -> AppResult<bool>;

  /// PENDING -> FAILED and gives the seat back.
  async fn expire_registration(&self, registration_id: Uuid) -> AppResult<bool>;

  async fn stale_pending_registrations(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>>;
}

#[derive(Debug, Clone)]
pub enum AttemptClaim {
  /// This caller inserted the attempt.
  Claimed(PaymentAttempt),
  /// An attempt for the same gateway order id already exists.
  Existing(PaymentAttempt),
}

#[async_trait]
pub trait PaymentAttemptStore: Send + Sync {
  /// Inserts the attempt unless one with the same gateway order id exists.
  async fn claim_attempt(&self, attempt: &NewPaymentAttempt) -> AppResult<AttemptClaim>;

  async fn record_attempt_outcome(
    &self,
    gateway_order_id: &str,
    outcome: crate::models::AttemptOutcome,
  ) -> AppResult<()>;

  async fn get_attempt(&self, gateway_order_id: &str) -> AppResult<Option<PaymentAttempt>>;
}

/// Everything the commerce engine persists.
pub trait Datastore:
  CatalogStore + CartMerger + LedgerStore + OrderStore + RegistrationStore + PaymentAttemptStore
{
}

impl<T> Datastore for T where
  T: CatalogStore + CartMerger + LedgerStore + OrderStore + RegistrationStore + PaymentAttemptStore
{
}
