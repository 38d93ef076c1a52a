// tests/stock_ledger_tests.rs
mod common;

use common::*;
use serial_test::serial;
use storefront::errors::AppError;
use storefront::models::{ReservationState, Transition};
use storefront::services::stock_ledger;
use storefront::store::LedgerStore;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn test_reserve_takes_units_and_release_returns_them_once() {
  let app = TestApp::new();
  let mug = app.product("Speckled Mug", 120_000, 450, 5).await;

  let reservation_id = stock_ledger::reserve(app.store.as_ref(), mug.id, 3).await.unwrap();
  assert_eq!(app.stock_of(mug.id).await, 2);

  assert_eq!(
    stock_ledger::release(app.store.as_ref(), reservation_id).await.unwrap(),
    Transition::Applied
  );
  assert_eq!(app.stock_of(mug.id).await, 5);

  assert_eq!(
    stock_ledger::release(app.store.as_ref(), reservation_id).await.unwrap(),
    Transition::AlreadyApplied
  );
  assert_eq!(app.stock_of(mug.id).await, 5);
}

#[tokio::test]
#[serial]
async fn test_reserve_more_than_on_hand_reports_availability() {
  let app = TestApp::new();
  let vase = app.product("Tall Vase", 350_000, 1_200, 2).await;

  let err = stock_ledger::reserve(app.store.as_ref(), vase.id, 3).await.unwrap_err();
  match err {
    AppError::OutOfStock {
      product_id,
      requested,
      available,
    } => {
      assert_eq!(product_id, vase.id);
      assert_eq!(requested, 3);
      assert_eq!(available, 2);
    }
    other => panic!("expected OutOfStock, got {other:?}"),
  }
  assert_eq!(app.stock_of(vase.id).await, 2);
}

#[tokio::test]
#[serial]
async fn test_reserve_rejects_non_positive_quantity_and_unknown_product() {
  let app = TestApp::new();
  let bowl = app.product("Rice Bowl", 60_000, 300, 4).await;

  assert!(matches!(
    stock_ledger::reserve(app.store.as_ref(), bowl.id, 0).await,
    Err(AppError::Validation(_))
  ));
  assert!(matches!(
    stock_ledger::reserve(app.store.as_ref(), Uuid::new_v4(), 1).await,
    Err(AppError::NotFound(_))
  ));
  assert_eq!(app.stock_of(bowl.id).await, 4);
}

#[tokio::test]
#[serial]
async fn test_committed_units_stay_sold_until_restocked() {
  let app = TestApp::new();
  let plate = app.product("Dinner Plate", 90_000, 600, 4).await;
  let reservation_id = stock_ledger::reserve(app.store.as_ref(), plate.id, 2).await.unwrap();

  assert_eq!(
    stock_ledger::commit(app.store.as_ref(), reservation_id).await.unwrap(),
    Transition::Applied
  );
  assert_eq!(app.stock_of(plate.id).await, 2);

  let err = stock_ledger::release(app.store.as_ref(), reservation_id).await.unwrap_err();
  assert!(matches!(err, AppError::InvalidStateTransition { entity: "reservation", .. }));
  assert_eq!(app.stock_of(plate.id).await, 2);

  assert_eq!(
    stock_ledger::restock(app.store.as_ref(), reservation_id).await.unwrap(),
    Transition::Applied
  );
  assert_eq!(
    stock_ledger::restock(app.store.as_ref(), reservation_id).await.unwrap(),
    Transition::AlreadyApplied
  );
  assert_eq!(app.stock_of(plate.id).await, 4);

  let reservation = app.store.get_reservation(reservation_id).await.unwrap().unwrap();
  assert_eq!(reservation.state, ReservationState::Restocked);
}

#[tokio::test]
#[serial]
async fn test_settling_an_unknown_reservation_is_not_found() {
  let app = TestApp::new();
  assert!(matches!(
    stock_ledger::commit(app.store.as_ref(), Uuid::new_v4()).await,
    Err(AppError::NotFound(_))
  ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_reservations_never_oversell() {
  let app = TestApp::new();
  let jar = app.product("Pickle Jar", 80_000, 700, 10).await;

  let product_id = jar.id;
  let mut handles = Vec::new();
  for _ in 0..50 {
    let store = app.store.clone();
    handles.push(tokio::spawn(async move {
      stock_ledger::reserve(store.as_ref(), product_id, 1).await
    }));
  }

  let mut reserved = 0;
  let mut refused = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(_) => reserved += 1,
      Err(AppError::OutOfStock { .. }) => refused += 1,
      Err(other) => panic!("unexpected error: {other:?}"),
    }
  }

  assert_eq!(reserved, 10);
  assert_eq!(refused, 40);
  assert_eq!(app.stock_of(jar.id).await, 0);
}
