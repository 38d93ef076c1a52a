// storefront/src/services/gateway.rs

//! Payment gateway order creation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};

/// An order opened at the gateway; the client pays against `id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOrder {
  pub id: String,
  pub amount: i64,
  pub currency: String,
  pub receipt: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  /// Opens a gateway order for `amount` minor units.
  async fn create_order(&self, amount: i64, currency: &str, receipt: &str) -> AppResult<GatewayOrder>;
}

/// In-process gateway for local runs and tests.
#[derive(Debug, Default)]
pub struct MockGateway {
  failing: AtomicBool,
  created: AtomicU64,
  latency: Duration,
}

impl MockGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Simulates network latency on every call.
  pub fn with_latency(latency: Duration) -> Self {
    Self {
      latency,
      ..Self::default()
    }
  }

  /// Makes subsequent `create_order` calls fail with a gateway error.
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn orders_created(&self) -> u64 {
    self.created.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentGateway for MockGateway {
  #[instrument(name = "MockGateway::create_order", skip(self), err)]
  async fn create_order(&self, amount: i64, currency: &str, receipt: &str) -> AppResult<GatewayOrder> {
    if amount <= 0 {
      return Err(AppError::Gateway("Amount must be greater than zero".to_string()));
    }
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    if self.failing.load(Ordering::SeqCst) {
      warn!("Simulated gateway failure.");
      return Err(AppError::Gateway("gateway unavailable".to_string()));
    }

    let id = format!("order_{}", Uuid::new_v4().simple());
    self.created.fetch_add(1, Ordering::SeqCst);
    info!(gateway_order_id = %id, "Mock gateway order created.");
    Ok(GatewayOrder {
      id,
      amount,
      currency: currency.to_string(),
      receipt: receipt.to_string(),
    })
  }
}
