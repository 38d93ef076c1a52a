// storefront/src/config.rs

use crate::errors::{AppError, Result};
use crate::services::pricing::StoreRates;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// When absent the in-memory datastore is used.
  pub database_url: Option<String>,
  pub seed_db: bool,

  pub currency: String,
  pub payment_key_id: String,
  pub payment_key_secret: String,

  pub hold_window_minutes: i64,
  pub sweep_interval_secs: u64,

  pub notify_sender: String,

  /// Users allowed to move orders through fulfilment.
  pub admin_user_ids: Vec<Uuid>,
  /// Guest carts untouched for this long are dropped by the sweep.
  pub guest_cart_ttl_hours: i64,

  /// Used when the datastore carries no store settings row.
  pub default_rates: StoreRates,
}

fn parse_var<T>(var_name: &str, raw: String) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {var_name}: {e}")))
}

fn parse_id_list(var_name: &str, raw: &str) -> Result<Vec<Uuid>> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|id| !id.is_empty())
    .map(|id| Uuid::parse_str(id).map_err(|e| AppError::Config(format!("Invalid {var_name} entry '{id}': {e}"))))
    .collect()
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{var_name}': {e}")))
    };
    let get_or = |var_name: &str, default: &str| get_env(var_name).unwrap_or_else(|_| default.to_string());

    let server_host = get_or("SERVER_HOST", "127.0.0.1");
    let server_port = parse_var("SERVER_PORT", get_or("SERVER_PORT", "8080"))?;
    let database_url = get_env("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
    let seed_db = parse_var("SEED_DB", get_or("SEED_DB", "false"))?;

    let currency = get_or("CURRENCY", "INR");
    let payment_key_id = get_or("PAYMENT_KEY_ID", "rzp_test_atelier");
    let payment_key_secret = get_env("PAYMENT_KEY_SECRET")?;
    if payment_key_secret.is_empty() {
      return Err(AppError::Config("PAYMENT_KEY_SECRET must not be empty".to_string()));
    }

    let hold_window_minutes: i64 = parse_var("HOLD_WINDOW_MINUTES", get_or("HOLD_WINDOW_MINUTES", "15"))?;
    let sweep_interval_secs: u64 = parse_var("SWEEP_INTERVAL_SECS", get_or("SWEEP_INTERVAL_SECS", "60"))?;
    let guest_cart_ttl_hours: i64 = parse_var("GUEST_CART_TTL_HOURS", get_or("GUEST_CART_TTL_HOURS", "72"))?;
    if hold_window_minutes <= 0 || sweep_interval_secs == 0 || guest_cart_ttl_hours <= 0 {
      return Err(AppError::Config(
        "HOLD_WINDOW_MINUTES, SWEEP_INTERVAL_SECS and GUEST_CART_TTL_HOURS must be positive".to_string(),
      ));
    }

    let notify_sender = get_or("NOTIFY_SENDER", "orders@atelier.example");
    let admin_user_ids = parse_id_list("ADMIN_USER_IDS", &get_or("ADMIN_USER_IDS", ""))?;
    if admin_user_ids.is_empty() {
      tracing::warn!("ADMIN_USER_IDS is empty; order fulfilment updates will be refused.");
    }

    let default_rates = StoreRates {
      base_rate: parse_var("SHIPPING_BASE_RATE", get_or("SHIPPING_BASE_RATE", "5000"))?,
      per_kg_rate: parse_var("SHIPPING_PER_KG_RATE", get_or("SHIPPING_PER_KG_RATE", "4000"))?,
      free_shipping_threshold: parse_var("FREE_SHIPPING_THRESHOLD", get_or("FREE_SHIPPING_THRESHOLD", "500000"))?,
      gst_percent: parse_var::<Decimal>("GST_PERCENT", get_or("GST_PERCENT", "12"))?,
    };
    default_rates.validate()?;

    tracing::info!(
      server_host = %server_host,
      server_port,
      in_memory = database_url.is_none(),
      currency = %currency,
      "Application configuration loaded successfully."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      seed_db,
      currency,
      payment_key_id,
      payment_key_secret,
      hold_window_minutes,
      sweep_interval_secs,
      notify_sender,
      admin_user_ids,
      guest_cart_ttl_hours,
      default_rates,
    })
  }

  /// A configuration for tests and local runs that needs no environment.
  pub fn for_memory(payment_key_secret: &str) -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: None,
      seed_db: false,
      currency: "INR".to_string(),
      payment_key_id: "rzp_test_atelier".to_string(),
      payment_key_secret: payment_key_secret.to_string(),
      hold_window_minutes: 15,
      sweep_interval_secs: 60,
      notify_sender: "orders@atelier.example".to_string(),
      admin_user_ids: Vec::new(),
      guest_cart_ttl_hours: 72,
      default_rates: StoreRates::default(),
    }
  }

  pub fn hold_window(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.hold_window_minutes)
  }

  pub fn guest_cart_ttl(&self) -> chrono::Duration {
    chrono::Duration::hours(self.guest_cart_ttl_hours)
  }

  pub fn is_admin(&self, user_id: Uuid) -> bool {
    self.admin_user_ids.contains(&user_id)
  }
}
