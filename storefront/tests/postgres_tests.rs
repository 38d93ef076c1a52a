// tests/postgres_tests.rs
//! Exercises the SQL datastore. Needs `TEST_DATABASE_URL` pointing at a
//! disposable database; without it every test logs and returns.
mod common;

use std::sync::Arc;

use common::*;
use serial_test::serial;
use storefront::errors::AppError;
use storefront::models::{OrderStatus, OwnerKey, PaymentStatus, Product, Transition, WorkshopSession};
use storefront::models::cart_line::LineInput;
use storefront::pipelines::checkout_pipeline;
use storefront::services::gateway::MockGateway;
use storefront::services::pricing::StoreRates;
use storefront::services::{booking, lifecycle, payment_gate, seed, stock_ledger, sweep};
use storefront::state::AppState;
use storefront::store::{CatalogStore, OrderStore, PgStore, RegistrationStore};
use uuid::Uuid;

async fn pg() -> Option<Arc<PgStore>> {
  setup_tracing();
  let url = match std::env::var("TEST_DATABASE_URL") {
    Ok(url) if !url.trim().is_empty() => url,
    _ => {
      tracing::warn!("TEST_DATABASE_URL not set; skipping Postgres test.");
      return None;
    }
  };
  let store = PgStore::connect(&url).await.unwrap();
  store.migrate().await.unwrap();
  Some(Arc::new(store))
}

fn pg_state(store: &Arc<PgStore>) -> AppState {
  AppState::postgres(
    store.clone(),
    Arc::new(MockGateway::new()),
    Arc::new(RecordingNotifier::default()),
    test_config(),
  )
}

async fn product(store: &PgStore, stock: i32) -> Product {
  let product = Product::new(&format!("Test Mug {}", Uuid::new_v4().simple()), 120_000, 450, stock);
  store.upsert_product(&product).await.unwrap();
  product
}

async fn stock_of(store: &PgStore, product_id: Uuid) -> i32 {
  store.get_product(product_id).await.unwrap().unwrap().stock
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_reservations_never_oversell() {
  let Some(store) = pg().await else { return };
  let mug_id = product(&store, 10).await.id;

  let mut handles = Vec::new();
  for _ in 0..30 {
    let store = store.clone();
    handles.push(tokio::spawn(async move {
      stock_ledger::reserve(store.as_ref(), mug_id, 1).await
    }));
  }
  let mut held = Vec::new();
  for handle in handles {
    match handle.await.unwrap() {
      Ok(reservation_id) => held.push(reservation_id),
      Err(AppError::OutOfStock { .. }) => {}
      Err(other) => panic!("unexpected error: {other}"),
    }
  }

  assert_eq!(held.len(), 10);
  assert_eq!(stock_of(&store, mug_id).await, 0);

  assert_eq!(stock_ledger::release(store.as_ref(), held[0]).await.unwrap(), Transition::Applied);
  assert_eq!(
    stock_ledger::release(store.as_ref(), held[0]).await.unwrap(),
    Transition::AlreadyApplied
  );
  assert_eq!(stock_of(&store, mug_id).await, 1);
}

#[tokio::test]
#[serial]
async fn test_pg_pending_order_rolls_back_on_a_short_line() {
  let Some(store) = pg().await else { return };
  let app = pg_state(&store);
  let mug = product(&store, 5).await;
  let vase = product(&store, 2).await;
  let owner = OwnerKey::User(Uuid::new_v4());
  app.carts.add_line(&owner, mug.id, 2).await.unwrap();
  app.carts.add_line(&owner, vase.id, 2).await.unwrap();
  let lines = app.carts.get_cart(&owner).await.unwrap();
  stock_ledger::reserve(store.as_ref(), vase.id, 1).await.unwrap();

  let err = lifecycle::create_pending_order(store.as_ref(), &owner, &lines, &StoreRates::default(), "INR")
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::OutOfStock { product_id, available: 1, .. } if product_id == vase.id));
  assert_eq!(stock_of(&store, mug.id).await, 5);
  assert_eq!(stock_of(&store, vase.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_seats_are_never_overbooked() {
  let Some(store) = pg().await else { return };
  let session = WorkshopSession::new("Wheel Throwing", 180_000, 3, chrono::Utc::now() + chrono::Duration::days(7));
  store.upsert_session(&session).await.unwrap();

  let mut handles = Vec::new();
  for n in 0..10 {
    let store = store.clone();
    let session_id = session.id;
    handles.push(tokio::spawn(async move {
      booking::reserve_seat(store.as_ref(), &draft(session_id, &format!("Guest{n}"))).await
    }));
  }
  let mut booked = Vec::new();
  for handle in handles {
    match handle.await.unwrap() {
      Ok(registration) => booked.push(registration),
      Err(AppError::SessionFull { .. }) => {}
      Err(other) => panic!("unexpected error: {other}"),
    }
  }
  assert_eq!(booked.len(), 3);
  assert!(booked.iter().all(|r| r.amount_paid == 180_000));

  assert!(booking::release_seat(store.as_ref(), booked[0].id).await.unwrap());
  assert!(!booking::release_seat(store.as_ref(), booked[0].id).await.unwrap());
  let stored = store.get_session(session.id).await.unwrap().unwrap();
  assert_eq!(stored.seats_booked, 2);
  let released = store.get_registration(booked[0].id).await.unwrap().unwrap();
  assert_eq!(released.payment_status, PaymentStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_duplicate_callbacks_claim_once() {
  let Some(store) = pg().await else { return };
  let app = pg_state(&store);
  let mug = product(&store, 4).await;
  let owner = OwnerKey::User(Uuid::new_v4());
  app.carts.add_line(&owner, mug.id, 1).await.unwrap();
  let receipt = checkout_pipeline::run_checkout(&app, owner).await.unwrap();
  let callback = signed_callback(&receipt.gateway_order_id);

  let mut handles = Vec::new();
  for _ in 0..6 {
    let app = app.clone();
    let callback = callback.clone();
    let order_id = receipt.order_id;
    handles.push(tokio::spawn(async move {
      payment_gate::verify_order_payment(&app, order_id, callback).await.unwrap()
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

  assert_eq!(first_deliveries, 1);
  let order = store.get_order(receipt.order_id).await.unwrap().unwrap();
  assert_eq!(order.status, OrderStatus::Confirmed);
  assert_eq!(stock_of(&store, mug.id).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_sweep_racing_a_payment_settles_exactly_one_way() {
  let Some(store) = pg().await else { return };
  let app = pg_state(&store);
  let mug = product(&store, 4).await;
  let owner = OwnerKey::Guest(Uuid::new_v4().to_string());
  app.carts.add_line(&owner, mug.id, 2).await.unwrap();
  let receipt = checkout_pipeline::run_checkout(&app, owner).await.unwrap();
  let later = chrono::Utc::now() + app.config.hold_window() + chrono::Duration::minutes(1);

  let sweeper = {
    let app = app.clone();
    tokio::spawn(async move { sweep::sweep_once(&app, later).await.unwrap() })
  };
  let payer = {
    let app = app.clone();
    let callback = signed_callback(&receipt.gateway_order_id);
    let order_id = receipt.order_id;
    tokio::spawn(async move { payment_gate::verify_order_payment(&app, order_id, callback).await })
  };
  sweeper.await.unwrap();
  let paid = payer.await.unwrap();

  let order = store.get_order(receipt.order_id).await.unwrap().unwrap();
  match paid {
    Ok(_) => {
      assert_eq!(order.status, OrderStatus::Confirmed);
      assert_eq!(stock_of(&store, mug.id).await, 2);
    }
    Err(AppError::ReservationExpired(_)) => {
      assert_eq!(order.status, OrderStatus::Cancelled);
      assert_eq!(stock_of(&store, mug.id).await, 4);
    }
    Err(other) => panic!("unexpected verification error: {other}"),
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_merges_consume_the_token_once() {
  let Some(store) = pg().await else { return };
  let app = pg_state(&store);
  let mug = product(&store, 10).await;
  let user_id = Uuid::new_v4();
  let token = Uuid::new_v4().to_string();

  let mut handles = Vec::new();
  for _ in 0..2 {
    let app = app.clone();
    let token = token.clone();
    let lines = vec![LineInput {
      product_id: mug.id,
      quantity: 3,
    }];
    handles.push(tokio::spawn(async move {
      app.carts.merge_guest_into_user(user_id, &token, Some(lines)).await.unwrap()
    }));
  }
  let mut merged = 0;
  for handle in handles {
    if !handle.await.unwrap().already_merged {
      merged += 1;
    }
  }

  assert_eq!(merged, 1);
  let cart = app.carts.lines(&OwnerKey::User(user_id)).await.unwrap();
  assert_eq!(cart.len(), 1);
  assert_eq!(cart[0].quantity, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_guest_carts_are_shared_and_increments_are_atomic() {
  let Some(store) = pg().await else { return };
  let first = pg_state(&store);
  let second = pg_state(&store);
  let mug_id = product(&store, 10).await.id;
  let owner = OwnerKey::Guest(Uuid::new_v4().to_string());

  first.carts.add_line(&owner, mug_id, 1).await.unwrap();
  assert_eq!(second.carts.lines(&owner).await.unwrap()[0].quantity, 1);

  let mut handles = Vec::new();
  for n in 0..15 {
    let app = if n % 2 == 0 { first.clone() } else { second.clone() };
    let owner = owner.clone();
    handles.push(tokio::spawn(async move { app.carts.add_line(&owner, mug_id, 1).await.is_ok() }));
  }
  let mut added = 0;
  for handle in handles {
    if handle.await.unwrap() {
      added += 1;
    }
  }

  assert_eq!(added, 9);
  assert_eq!(first.carts.lines(&owner).await.unwrap()[0].quantity, 10);

  let receipt = checkout_pipeline::run_checkout(&second, owner.clone()).await.unwrap();
  assert_eq!(stock_of(&store, mug_id).await, 0);
  assert!(store.get_order(receipt.order_id).await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn test_pg_idle_guest_carts_are_purged() {
  let Some(store) = pg().await else { return };
  let app = pg_state(&store);
  let mug = product(&store, 5).await;
  let owner = OwnerKey::Guest(Uuid::new_v4().to_string());
  app.carts.add_line(&owner, mug.id, 1).await.unwrap();

  let later = chrono::Utc::now() + app.config.guest_cart_ttl() + chrono::Duration::hours(1);
  let report = sweep::sweep_once(&app, later).await.unwrap();

  assert!(report.guest_carts_purged >= 1);
  assert!(app.carts.lines(&owner).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_pg_reseeding_leaves_outstanding_holds_intact() {
  let Some(store) = pg().await else { return };
  let rates = StoreRates::default();
  let mug_id = seed::seeded_id(0x01);
  let session_id = seed::seeded_id(0x101);
  seed::seed_catalog(store.as_ref(), &rates).await.unwrap();
  let opening = stock_of(&store, mug_id).await;
  let seats_before = store.get_session(session_id).await.unwrap().unwrap().seats_booked;

  let hold = stock_ledger::reserve(store.as_ref(), mug_id, 3).await.unwrap();
  let seat = booking::reserve_seat(store.as_ref(), &draft(session_id, "Meera")).await.unwrap();
  seed::seed_catalog(store.as_ref(), &rates).await.unwrap();

  assert_eq!(stock_of(&store, mug_id).await, opening - 3);
  let session = store.get_session(session_id).await.unwrap().unwrap();
  assert_eq!(session.seats_booked, seats_before + 1);

  stock_ledger::release(store.as_ref(), hold).await.unwrap();
  booking::release_seat(store.as_ref(), seat.id).await.unwrap();
  assert_eq!(stock_of(&store, mug_id).await, opening);
}
