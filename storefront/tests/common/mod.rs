// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::Level;
use uuid::Uuid;

use storefront::config::AppConfig;
use storefront::errors::Result as AppResult;
use storefront::models::{OwnerKey, Product, RegistrationDraft, WorkshopSession};
use storefront::services::gateway::MockGateway;
use storefront::services::notifier::{Notification, Notifier};
use storefront::services::payment_gate::{self, PaymentCallback};
use storefront::state::AppState;
use storefront::store::{CatalogStore, MemoryStore};

pub const SECRET: &str = "test_key_secret";
pub const ADMIN_ID: Uuid = Uuid::from_u128(0xad31_0000_0000_0000_0000_0000_0000_0001);

pub fn test_config() -> AppConfig {
  let mut config = AppConfig::for_memory(SECRET);
  config.admin_user_ids = vec![ADMIN_ID];
  config
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

/// Keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
  pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn notify(&self, notification: &Notification) -> AppResult<()> {
    self.sent.lock().push(notification.clone());
    Ok(())
  }
}

pub struct TestApp {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub guest_carts: Arc<MemoryStore>,
  pub gateway: Arc<MockGateway>,
  pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
  pub fn new() -> Self {
    setup_tracing();
    let store = Arc::new(MemoryStore::new());
    let guest_carts = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(
      store.clone(),
      store.clone(),
      guest_carts.clone(),
      gateway.clone(),
      notifier.clone(),
      test_config(),
    );
    Self {
      state,
      store,
      guest_carts,
      gateway,
      notifier,
    }
  }

  /// Another server over the same datastores, as behind a load balancer.
  pub fn second_instance(&self) -> AppState {
    AppState::new(
      self.store.clone(),
      self.store.clone(),
      self.guest_carts.clone(),
      self.gateway.clone(),
      self.notifier.clone(),
      test_config(),
    )
  }

  pub async fn product(&self, name: &str, price: i64, weight_grams: i32, stock: i32) -> Product {
    let product = Product::new(name, price, weight_grams, stock);
    self.store.upsert_product(&product).await.unwrap();
    product
  }

  pub async fn stock_of(&self, product_id: Uuid) -> i32 {
    self.store.get_product(product_id).await.unwrap().unwrap().stock
  }

  pub async fn session(&self, seats_total: i32, price: i64) -> WorkshopSession {
    let session = WorkshopSession::new("Wheel Throwing", price, seats_total, Utc::now() + Duration::days(7));
    self.store.upsert_session(&session).await.unwrap();
    session
  }

  pub async fn seats_booked(&self, session_id: Uuid) -> i32 {
    self.store.get_session(session_id).await.unwrap().unwrap().seats_booked
  }

  /// A moment after every hold placed now has expired.
  pub fn after_hold_window(&self) -> chrono::DateTime<Utc> {
    Utc::now() + self.state.config.hold_window() + Duration::minutes(1)
  }
}

pub fn guest(token: &str) -> OwnerKey {
  OwnerKey::Guest(token.to_string())
}

pub fn user() -> OwnerKey {
  OwnerKey::User(Uuid::new_v4())
}

pub fn draft(session_id: Uuid, name: &str) -> RegistrationDraft {
  RegistrationDraft {
    id: Uuid::new_v4(),
    session_id,
    customer_name: name.to_string(),
    customer_email: format!("{}@example.com", name.to_lowercase()),
    customer_phone: "+91 98765 43210".to_string(),
  }
}

/// A callback exactly as the gateway would sign it.
pub fn signed_callback(gateway_order_id: &str) -> PaymentCallback {
  let gateway_payment_id = format!("pay_{}", Uuid::new_v4().simple());
  let signature = payment_gate::sign(SECRET, gateway_order_id, &gateway_payment_id).unwrap();
  PaymentCallback {
    gateway_order_id: gateway_order_id.to_string(),
    gateway_payment_id,
    signature,
  }
}
