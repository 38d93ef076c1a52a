// storefront/src/pipelines/contexts.rs

//! Context data carried through each pipeline.
//! Handlers receive these wrapped in `atelier_flow::ContextData`.

use uuid::Uuid;

use crate::models::{Order, OrderStatus, OwnerKey, PaymentStatus, Registration, RegistrationDraft, WorkshopSession};
use crate::services::cart::CartViewLine;
use crate::services::gateway::GatewayOrder;
use crate::services::payment_gate::PaymentCallback;
use crate::services::pricing::StoreRates;
use crate::state::AppState;

// --- Checkout ---

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub owner: OwnerKey,
  pub lines: Vec<CartViewLine>,
  pub rates: Option<StoreRates>,
  pub order: Option<Order>,
  pub gateway_order: Option<GatewayOrder>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, owner: OwnerKey) -> Self {
    Self {
      app_state,
      owner,
      lines: Vec::new(),
      rates: None,
      order: None,
      gateway_order: None,
    }
  }
}

#[derive(Clone)]
pub struct WorkshopCheckoutCtxData {
  pub app_state: AppState,
  pub draft: RegistrationDraft,
  pub session: Option<WorkshopSession>,
  pub registration: Option<Registration>,
  pub gateway_order: Option<GatewayOrder>,
}

impl WorkshopCheckoutCtxData {
  pub fn new(app_state: AppState, draft: RegistrationDraft) -> Self {
    Self {
      app_state,
      draft,
      session: None,
      registration: None,
      gateway_order: None,
    }
  }
}

// --- Payment verification ---

#[derive(Clone)]
pub struct OrderPaymentCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub callback: PaymentCallback,
  pub order: Option<Order>,
  pub status: Option<OrderStatus>,
  pub already_processed: bool,
}

impl OrderPaymentCtxData {
  pub fn new(app_state: AppState, order_id: Uuid, callback: PaymentCallback) -> Self {
    Self {
      app_state,
      order_id,
      callback,
      order: None,
      status: None,
      already_processed: false,
    }
  }
}

#[derive(Clone)]
pub struct RegistrationPaymentCtxData {
  pub app_state: AppState,
  pub registration_id: Uuid,
  pub callback: PaymentCallback,
  pub registration: Option<Registration>,
  pub status: Option<PaymentStatus>,
  pub already_processed: bool,
}

impl RegistrationPaymentCtxData {
  pub fn new(app_state: AppState, registration_id: Uuid, callback: PaymentCallback) -> Self {
    Self {
      app_state,
      registration_id,
      callback,
      registration: None,
      status: None,
      already_processed: false,
    }
  }
}
