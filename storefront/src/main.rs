// storefront/src/main.rs

use std::sync::Arc;

use actix_web::{web as actix_data, App, HttpServer};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

use storefront::config::AppConfig;
use storefront::errors::AppError;
use storefront::services::gateway::MockGateway;
use storefront::services::notifier::LogNotifier;
use storefront::services::{seed, sweep};
use storefront::state::AppState;
use storefront::store::{Datastore, PgStore};
use storefront::web::configure_app_routes;

fn startup_error(context: &str, err: AppError) -> std::io::Error {
  tracing::error!(error = %err, "{context}");
  std::io::Error::other(format!("{context}: {err}"))
}

async fn build_state(config: AppConfig) -> Result<AppState, AppError> {
  let state = match config.database_url.clone() {
    Some(url) => {
      let store = Arc::new(PgStore::connect(&url).await?);
      store.migrate().await?;
      let gateway = Arc::new(MockGateway::new());
      let notifier = Arc::new(LogNotifier::new(config.notify_sender.clone()));
      AppState::postgres(store, gateway, notifier, config)
    }
    None => {
      tracing::warn!("DATABASE_URL not set; using the in-memory datastore. Run a single instance only.");
      AppState::in_memory(config)
    }
  };

  if state.config.seed_db {
    let store: &dyn Datastore = state.store.as_ref();
    seed::seed_catalog(store, &state.config.default_rates).await?;
  }
  Ok(state)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting Atelier storefront server...");

  let config = AppConfig::from_env().map_err(|e| startup_error("Failed to load application configuration", e))?;
  let server_address = format!("{}:{}", config.server_host, config.server_port);

  let app_state = build_state(config)
    .await
    .map_err(|e| startup_error("Failed to initialise the datastore", e))?;

  let _sweeper = sweep::spawn_sweeper(app_state.clone());

  tracing::info!("Attempting to bind server to {}...", server_address);
  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
