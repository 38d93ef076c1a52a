// tests/config_tests.rs
mod common;

use std::env;

use common::setup_tracing;
use rust_decimal::Decimal;
use serial_test::serial;
use storefront::config::AppConfig;
use storefront::errors::AppError;
use uuid::Uuid;

const VARS: [&str; 8] = [
  "PAYMENT_KEY_SECRET",
  "DATABASE_URL",
  "HOLD_WINDOW_MINUTES",
  "GST_PERCENT",
  "SERVER_PORT",
  "SWEEP_INTERVAL_SECS",
  "ADMIN_USER_IDS",
  "GUEST_CART_TTL_HOURS",
];

fn clear_env() {
  for var in VARS {
    env::remove_var(var);
  }
}

#[test]
#[serial]
fn test_defaults_apply_when_only_the_secret_is_set() {
  setup_tracing();
  clear_env();
  env::set_var("PAYMENT_KEY_SECRET", "s3cret");

  let config = AppConfig::from_env().unwrap();

  assert!(config.database_url.is_none());
  assert_eq!(config.currency, "INR");
  assert_eq!(config.hold_window_minutes, 15);
  assert_eq!(config.default_rates.gst_percent, Decimal::from(12));
  assert_eq!(config.default_rates.base_rate, 5_000);
  assert!(config.admin_user_ids.is_empty());
  assert_eq!(config.guest_cart_ttl_hours, 72);
  clear_env();
}

#[test]
#[serial]
fn test_missing_payment_secret_is_a_config_error() {
  setup_tracing();
  clear_env();
  assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));
}

#[test]
#[serial]
fn test_bad_numbers_are_reported() {
  setup_tracing();
  clear_env();
  env::set_var("PAYMENT_KEY_SECRET", "s3cret");

  env::set_var("HOLD_WINDOW_MINUTES", "0");
  assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));

  env::set_var("HOLD_WINDOW_MINUTES", "15");
  env::set_var("GST_PERCENT", "140");
  assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));

  env::set_var("GST_PERCENT", "12");
  env::set_var("SERVER_PORT", "eighty");
  assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));
  clear_env();
}

#[test]
#[serial]
fn test_blank_database_url_means_in_memory() {
  setup_tracing();
  clear_env();
  env::set_var("PAYMENT_KEY_SECRET", "s3cret");
  env::set_var("DATABASE_URL", "  ");

  assert!(AppConfig::from_env().unwrap().database_url.is_none());
  clear_env();
}

#[test]
#[serial]
fn test_admin_ids_are_parsed_and_checked() {
  setup_tracing();
  clear_env();
  env::set_var("PAYMENT_KEY_SECRET", "s3cret");
  let first = Uuid::new_v4();
  let second = Uuid::new_v4();
  env::set_var("ADMIN_USER_IDS", format!(" {first}, {second} ,"));

  let config = AppConfig::from_env().unwrap();
  assert_eq!(config.admin_user_ids, vec![first, second]);
  assert!(config.is_admin(second));
  assert!(!config.is_admin(Uuid::new_v4()));

  env::set_var("ADMIN_USER_IDS", "root");
  assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));

  env::remove_var("ADMIN_USER_IDS");
  env::set_var("GUEST_CART_TTL_HOURS", "0");
  assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));
  clear_env();
}
