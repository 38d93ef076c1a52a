// tests/payment_verification_tests.rs
mod common;

use std::time::Duration;

use common::*;
use serial_test::serial;
use storefront::errors::AppError;
use storefront::models::{AttemptOutcome, AttemptTarget, OrderStatus, OwnerKey, PaymentStatus};
use storefront::pipelines::checkout_pipeline::{self, CheckoutReceipt};
use storefront::pipelines::workshop_pipeline;
use storefront::services::notifier::Notification;
use storefront::services::payment_gate;
use storefront::services::sweep;
use storefront::store::{OrderStore, PaymentAttemptStore, RegistrationStore};

async fn checkout(app: &TestApp, owner: &OwnerKey, product_id: uuid::Uuid, quantity: i32) -> CheckoutReceipt {
  app.state.carts.add_line(owner, product_id, quantity).await.unwrap();
  checkout_pipeline::run_checkout(&app.state, owner.clone()).await.unwrap()
}

async fn order_status(app: &TestApp, receipt: &CheckoutReceipt) -> OrderStatus {
  app.store.get_order(receipt.order_id).await.unwrap().unwrap().status
}

/// Lets detached notification tasks run.
async fn settle() {
  tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
#[serial]
async fn test_checkout_opens_a_gateway_order_for_the_total() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 200_000, 1_500, 4).await;
  let owner = user();

  let receipt = checkout(&app, &owner, mug.id, 1).await;

  // 200000 + 9000 shipping (1.5 kg) + 24000 GST.
  assert_eq!(receipt.amount, 233_000);
  assert_eq!(receipt.currency, "INR");
  assert_eq!(receipt.key_id, app.state.config.payment_key_id);
  assert!(receipt.gateway_order_id.starts_with("order_"));
  assert_eq!(app.gateway.orders_created(), 1);

  let order = app.store.get_order(receipt.order_id).await.unwrap().unwrap();
  assert_eq!(order.status, OrderStatus::Pending);
  assert_eq!(order.gateway_order_id.as_deref(), Some(receipt.gateway_order_id.as_str()));
  assert_eq!(app.stock_of(mug.id).await, 3);
  // The cart survives until the payment is verified.
  assert_eq!(app.state.carts.lines(&owner).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_checkout_of_an_empty_cart_is_rejected() {
  let app = TestApp::new();
  let err = checkout_pipeline::run_checkout(&app.state, user()).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(_)));
  assert_eq!(app.gateway.orders_created(), 0);
}

#[tokio::test]
#[serial]
async fn test_gateway_failure_cancels_the_pending_order() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 4).await;
  let owner = guest("g-gateway-down");
  app.state.carts.add_line(&owner, mug.id, 2).await.unwrap();
  app.gateway.set_failing(true);

  let err = checkout_pipeline::run_checkout(&app.state, owner.clone()).await.unwrap_err();

  assert!(matches!(err, AppError::Gateway(_)));
  assert_eq!(app.stock_of(mug.id).await, 4);
  assert!(app
    .store
    .stale_pending_orders(app.after_hold_window())
    .await
    .unwrap()
    .is_empty());
  assert_eq!(app.state.carts.lines(&owner).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_verified_payment_confirms_once_and_replays_report_processed() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 4).await;
  let owner = user();
  let receipt = checkout(&app, &owner, mug.id, 2).await;
  let callback = signed_callback(&receipt.gateway_order_id);

  let first = payment_gate::verify_order_payment(&app.state, receipt.order_id, callback.clone())
    .await
    .unwrap();
  assert_eq!(first.target, AttemptTarget::Order(receipt.order_id));
  assert_eq!(first.status, "CONFIRMED");
  assert!(!first.already_processed);

  let replay = payment_gate::verify_order_payment(&app.state, receipt.order_id, callback.clone())
    .await
    .unwrap();
  assert_eq!(replay.status, "CONFIRMED");
  assert!(replay.already_processed);

  assert_eq!(order_status(&app, &receipt).await, OrderStatus::Confirmed);
  assert_eq!(app.stock_of(mug.id).await, 2);
  assert!(app.state.carts.lines(&owner).await.unwrap().is_empty());
  let attempt = app
    .store
    .get_attempt(&receipt.gateway_order_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(attempt.outcome, AttemptOutcome::Confirmed);

  settle().await;
  let sent = app.notifier.sent.lock().clone();
  assert_eq!(sent.len(), 1);
  assert!(matches!(
    &sent[0],
    Notification::OrderConfirmed { order_id, total: 273_800, .. } if *order_id == receipt.order_id
  ));
}

#[tokio::test]
#[serial]
async fn test_tampered_signature_leaves_the_order_pending() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 4).await;
  let receipt = checkout(&app, &user(), mug.id, 1).await;

  let mut forged = signed_callback(&receipt.gateway_order_id);
  forged.gateway_payment_id = "pay_someone_else".to_string();
  let err = payment_gate::verify_order_payment(&app.state, receipt.order_id, forged)
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::SignatureInvalid));

  let mut garbage = signed_callback(&receipt.gateway_order_id);
  garbage.signature = "not-hex".to_string();
  assert!(matches!(
    payment_gate::verify_order_payment(&app.state, receipt.order_id, garbage).await,
    Err(AppError::SignatureInvalid)
  ));

  assert_eq!(order_status(&app, &receipt).await, OrderStatus::Pending);
  assert!(app.store.get_attempt(&receipt.gateway_order_id).await.unwrap().is_none());
  assert_eq!(app.stock_of(mug.id).await, 3);
}

#[tokio::test]
#[serial]
async fn test_callback_for_another_order_is_rejected() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 4).await;
  let mine = checkout(&app, &user(), mug.id, 1).await;
  let theirs = checkout(&app, &user(), mug.id, 1).await;

  let err = payment_gate::verify_order_payment(&app.state, mine.order_id, signed_callback(&theirs.gateway_order_id))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::Validation(_)));
  assert_eq!(order_status(&app, &mine).await, OrderStatus::Pending);
  assert_eq!(order_status(&app, &theirs).await, OrderStatus::Pending);
}

#[tokio::test]
#[serial]
async fn test_payment_after_the_sweep_reports_expiry() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 4).await;
  let receipt = checkout(&app, &user(), mug.id, 2).await;

  let report = sweep::sweep_once(&app.state, app.after_hold_window()).await.unwrap();
  assert_eq!(report.orders_cancelled, 1);
  assert_eq!(app.stock_of(mug.id).await, 4);

  let callback = signed_callback(&receipt.gateway_order_id);
  let err = payment_gate::verify_order_payment(&app.state, receipt.order_id, callback.clone())
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::ReservationExpired(_)));

  // A retry of the same callback gets the same answer.
  assert!(matches!(
    payment_gate::verify_order_payment(&app.state, receipt.order_id, callback).await,
    Err(AppError::ReservationExpired(_))
  ));
  assert_eq!(order_status(&app, &receipt).await, OrderStatus::Cancelled);
  assert_eq!(app.stock_of(mug.id).await, 4);
  let attempt = app
    .store
    .get_attempt(&receipt.gateway_order_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(attempt.outcome, AttemptOutcome::Expired);
  settle().await;
  assert!(app.notifier.sent.lock().is_empty());
}

#[tokio::test]
#[serial]
async fn test_workshop_checkout_and_payment() {
  let app = TestApp::new();
  let session = app.session(2, 180_000).await;

  let receipt = workshop_pipeline::run_workshop_checkout(&app.state, draft(session.id, "Anika"))
    .await
    .unwrap();
  assert_eq!(receipt.amount, 180_000);
  assert_eq!(app.seats_booked(session.id).await, 1);

  let callback = signed_callback(&receipt.gateway_order_id);
  let outcome = payment_gate::verify_registration_payment(&app.state, receipt.registration_id, callback.clone())
    .await
    .unwrap();
  assert_eq!(outcome.status, "PAID");
  assert!(!outcome.already_processed);

  let replay = payment_gate::verify_registration_payment(&app.state, receipt.registration_id, callback)
    .await
    .unwrap();
  assert!(replay.already_processed);

  let registration = app
    .store
    .get_registration(receipt.registration_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(registration.payment_status, PaymentStatus::Paid);
  assert_eq!(app.seats_booked(session.id).await, 1);

  settle().await;
  let sent = app.notifier.sent.lock().clone();
  assert_eq!(sent.len(), 1);
  assert!(matches!(&sent[0], Notification::RegistrationConfirmed { customer_name, .. } if customer_name == "Anika"));
}

#[tokio::test]
#[serial]
async fn test_order_callback_cannot_pay_for_a_registration() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 4).await;
  let session = app.session(2, 180_000).await;
  let order_receipt = checkout(&app, &user(), mug.id, 1).await;
  let seat_receipt = workshop_pipeline::run_workshop_checkout(&app.state, draft(session.id, "Ishaan"))
    .await
    .unwrap();

  let err = payment_gate::verify_registration_payment(
    &app.state,
    seat_receipt.registration_id,
    signed_callback(&order_receipt.gateway_order_id),
  )
  .await
  .unwrap_err();

  assert!(matches!(err, AppError::Validation(_)));
  let registration = app
    .store
    .get_registration(seat_receipt.registration_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(registration.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
#[serial]
async fn test_workshop_gateway_failure_gives_the_seat_back() {
  let app = TestApp::new();
  let session = app.session(1, 180_000).await;
  app.gateway.set_failing(true);

  let err = workshop_pipeline::run_workshop_checkout(&app.state, draft(session.id, "Zoya"))
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Gateway(_)));
  assert_eq!(app.seats_booked(session.id).await, 0);

  app.gateway.set_failing(false);
  workshop_pipeline::run_workshop_checkout(&app.state, draft(session.id, "Zoya"))
    .await
    .unwrap();
  assert_eq!(app.seats_booked(session.id).await, 1);
  assert!(matches!(
    workshop_pipeline::run_workshop_checkout(&app.state, draft(session.id, "Kabir")).await,
    Err(AppError::SessionFull { .. })
  ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_duplicate_deliveries_confirm_once() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 4).await;
  let receipt = checkout(&app, &user(), mug.id, 1).await;
  let callback = signed_callback(&receipt.gateway_order_id);

  let mut handles = Vec::new();
  for _ in 0..8 {
    let state = app.state.clone();
    let callback = callback.clone();
    let order_id = receipt.order_id;
    handles.push(tokio::spawn(async move {
      payment_gate::verify_order_payment(&state, order_id, callback).await.unwrap()
    }));
  }
  let mut first_deliveries = 0;
  for handle in handles {
    let outcome = handle.await.unwrap();
    assert_eq!(outcome.status, "CONFIRMED");
    if !outcome.already_processed {
      first_deliveries += 1;
    }
  }
  settle().await;

  assert_eq!(first_deliveries, 1);
  assert_eq!(order_status(&app, &receipt).await, OrderStatus::Confirmed);
  assert_eq!(app.stock_of(mug.id).await, 3);
  let attempt = app.store.get_attempt(&receipt.gateway_order_id).await.unwrap().unwrap();
  assert_eq!(attempt.outcome, AttemptOutcome::Confirmed);
  assert_eq!(app.notifier.sent.lock().len(), 1);
}
