// storefront/src/state.rs

use std::sync::Arc;

use atelier_flow::FlowRegistry;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::pipelines;
use crate::services::cart::CartStore;
use crate::services::gateway::{MockGateway, PaymentGateway};
use crate::services::notifier::{LogNotifier, Notifier};
use crate::store::{CartMerger, Datastore, GuestCartRepository, MemoryStore, PgGuestCarts, PgStore};

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Datastore>,
  pub carts: CartStore,
  pub gateway: Arc<dyn PaymentGateway>,
  pub notifier: Arc<dyn Notifier>,
  pub flow: Arc<FlowRegistry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires the services together and registers every pipeline.
  ///
  /// `durable_carts` is the same datastore as `store`, passed separately as
  /// its cart capability. `guest_carts` must be shared by every instance that
  /// serves the same shoppers.
  pub fn new(
    store: Arc<dyn Datastore>,
    durable_carts: Arc<dyn CartMerger>,
    guest_carts: Arc<dyn GuestCartRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: AppConfig,
  ) -> Self {
    let carts = CartStore::new(durable_carts, guest_carts, Arc::clone(&store));

    let flow = Arc::new(FlowRegistry::<AppError>::new());
    pipelines::register_all_pipelines(&flow);

    Self {
      store,
      carts,
      gateway,
      notifier,
      flow,
      config: Arc::new(config),
    }
  }

  /// Postgres for everything, guest carts included.
  pub fn postgres(
    store: Arc<PgStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: AppConfig,
  ) -> Self {
    let guest_carts = Arc::new(PgGuestCarts::new(store.pool().clone()));
    Self::new(store.clone(), store, guest_carts, gateway, notifier, config)
  }

  /// Everything in memory, with the mock gateway and the logging notifier.
  /// Suitable for a single instance only.
  pub fn in_memory(config: AppConfig) -> Self {
    let store = Arc::new(MemoryStore::new());
    let notifier = LogNotifier::new(config.notify_sender.clone());
    Self::new(
      store.clone(),
      store,
      Arc::new(MemoryStore::new()),
      Arc::new(MockGateway::new()),
      Arc::new(notifier),
      config,
    )
  }
}
