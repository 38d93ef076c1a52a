// storefront/src/errors.rs

use actix_web::{HttpResponse, ResponseError};
use atelier_flow::FlowError;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Out of stock for product {product_id}: requested {requested}, available {available}")]
  OutOfStock {
    product_id: Uuid,
    requested: i32,
    available: i32,
  },

  #[error("Workshop session {session_id} is full")]
  SessionFull { session_id: Uuid },

  #[error("Payment signature is invalid")]
  SignatureInvalid,

  #[error("Reservation expired: {0}")]
  ReservationExpired(String),

  #[error("Invalid state transition for {entity}: {from} -> {to}")]
  InvalidStateTransition {
    entity: &'static str,
    from: String,
    to: String,
  },

  #[error("Payment Gateway Error: {0}")]
  Gateway(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),

  #[error("Pipeline execution was halted by a handler.")]
  PipelineHaltedByHandler,
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    let err = match err.downcast::<AppError>() {
      Ok(app_err) => return app_err,
      Err(err) => err,
    };
    match err.downcast::<sqlx::Error>() {
      Ok(db_err) => AppError::Sqlx(db_err),
      Err(err) => AppError::Internal(err.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn error_response(&self) -> HttpResponse {
    match self {
      AppError::SignatureInvalid | AppError::InvalidStateTransition { .. } | AppError::Forbidden(_) => {
        tracing::warn!(application_error = %self, "Responding with error");
      }
      AppError::Sqlx(_) | AppError::Migrate(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        tracing::error!(application_error = %self, "Responding with error");
      }
      _ => tracing::info!(application_error = %self, "Responding with error"),
    }
    match self {
      AppError::Validation(m) => HttpResponse::BadRequest().json(json!({"error": "Validation", "detail": m})),
      AppError::Auth(m) => HttpResponse::Unauthorized().json(json!({"error": "Auth", "detail": m})),
      AppError::Forbidden(m) => HttpResponse::Forbidden().json(json!({"error": "Forbidden", "detail": m})),
      AppError::NotFound(m) => HttpResponse::NotFound().json(json!({"error": "NotFound", "detail": m})),
      AppError::OutOfStock {
        product_id,
        requested,
        available,
      } => HttpResponse::Conflict().json(json!({
        "error": "OutOfStock",
        "productId": product_id,
        "requested": requested,
        "available": available,
      })),
      AppError::SessionFull { session_id } => {
        HttpResponse::Conflict().json(json!({"error": "SessionFull", "sessionId": session_id}))
      }
      AppError::SignatureInvalid => HttpResponse::BadRequest().json(json!({"error": "SignatureInvalid"})),
      AppError::ReservationExpired(m) => HttpResponse::Gone().json(json!({"error": "ReservationExpired", "detail": m})),
      AppError::InvalidStateTransition { entity, from, to } => HttpResponse::Conflict().json(json!({
        "error": "InvalidStateTransition",
        "entity": entity,
        "from": from,
        "to": to,
      })),
      AppError::Gateway(m) => HttpResponse::BadGateway().json(json!({"error": "Gateway", "detail": m})),
      AppError::Config(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "Configuration issue", "detail": m}))
      }
      AppError::Sqlx(_) | AppError::Migrate(_) => {
        HttpResponse::InternalServerError().json(json!({"error": "Database operation failed"}))
      }
      AppError::Workflow { source } => {
        tracing::error!(flow_error_source = ?source, "Workflow error details");
        HttpResponse::InternalServerError().json(json!({"error": "Workflow processing error"}))
      }
      AppError::Internal(_) => HttpResponse::InternalServerError().json(json!({"error": "An internal error occurred"})),
      AppError::PipelineHaltedByHandler => {
        HttpResponse::Conflict().json(json!({"error": "Process halted by business logic."}))
      }
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
