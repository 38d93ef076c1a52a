// storefront/src/models/mod.rs

//! Data structures representing datastore entities.

pub mod cart_line;
pub mod order;
pub mod order_item;
pub mod payment_attempt;
pub mod product;
pub mod reservation;
pub mod store_settings;
pub mod workshop;

pub use cart_line::{CartLine, OwnerKey};
pub use order::{Order, OrderDraft, OrderStatus};
pub use order_item::OrderItem;
pub use payment_attempt::{AttemptOutcome, AttemptTarget, NewPaymentAttempt, PaymentAttempt};
pub use product::Product;
pub use reservation::{Reservation, ReservationState};
pub use store_settings::StoreSettings;
pub use workshop::{PaymentStatus, Registration, RegistrationDraft, WorkshopSession};

/// Result of a guarded status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  /// The row moved from the expected state to the target state.
  Applied,
  /// The row was already in (or past) the target state; nothing changed.
  AlreadyApplied,
}
