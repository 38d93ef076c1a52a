// storefront/src/services/notifier.rs

//! Post-confirmation notifications.
//!
//! Delivery happens on a detached task. A failed notification is logged and
//! never affects the transition that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::errors::Result as AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notification {
  #[serde(rename_all = "camelCase")]
  OrderConfirmed {
    order_id: Uuid,
    owner_key: String,
    total: i64,
    currency: String,
  },
  #[serde(rename_all = "camelCase")]
  RegistrationConfirmed {
    registration_id: Uuid,
    session_id: Uuid,
    customer_name: String,
    customer_email: String,
  },
}

impl Notification {
  pub fn subject(&self) -> String {
    match self {
      Notification::OrderConfirmed { order_id, .. } => format!("Your Atelier order {order_id} is confirmed"),
      Notification::RegistrationConfirmed { customer_name, .. } => {
        format!("{customer_name}, your workshop seat is confirmed")
      }
    }
  }
}

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, notification: &Notification) -> AppResult<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogNotifier {
  sender: String,
}

impl LogNotifier {
  pub fn new(sender: impl Into<String>) -> Self {
    Self { sender: sender.into() }
  }
}

#[async_trait]
impl Notifier for LogNotifier {
  async fn notify(&self, notification: &Notification) -> AppResult<()> {
    info!(
      from = %self.sender,
      subject = %notification.subject(),
      ?notification,
      "Notification dispatched."
    );
    Ok(())
  }
}

/// Sends `notification` on a detached task.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) -> JoinHandle<()> {
  let span = tracing::info_span!("notify", subject = %notification.subject());
  tokio::spawn(
    async move {
      if let Err(e) = notifier.notify(&notification).await {
        warn!(error = %e, "Notification failed.");
      }
    }
    .instrument(span),
  )
}
