// storefront/src/web/extractors.rs

//! Caller identity from request headers.
//!
//! The identity provider sits in front of this service and forwards the
//! authenticated user id as `X-User-ID`. Anonymous shoppers carry an opaque
//! `X-Guest-Token` issued by the storefront client. Fulfilment is reserved
//! for the user ids listed in `ADMIN_USER_IDS`.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::OwnerKey;
use crate::state::AppState;

pub const USER_HEADER: &str = "X-User-ID";
pub const GUEST_HEADER: &str = "X-Guest-Token";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req
    .headers()
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

fn user_id(req: &HttpRequest) -> Option<Result<Uuid, AppError>> {
  header(req, USER_HEADER).map(|raw| {
    Uuid::parse_str(raw).map_err(|_| {
      warn!("Rejected malformed {USER_HEADER} header.");
      AppError::Auth(format!("{USER_HEADER} is not a valid user id."))
    })
  })
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let result = match user_id(req) {
      Some(parsed) => parsed.map(|user_id| AuthenticatedUser { user_id }),
      None => Err(AppError::Auth(format!("User authentication required ({USER_HEADER})."))),
    };
    ready(result)
  }
}

/// Whose cart the request acts on. A signed-in user wins over a guest token.
#[derive(Debug, Clone)]
pub struct CartOwner(pub OwnerKey);

impl FromRequest for CartOwner {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let result = match user_id(req) {
      Some(parsed) => parsed.map(|id| CartOwner(OwnerKey::User(id))),
      None => match header(req, GUEST_HEADER) {
        Some(token) => Ok(CartOwner(OwnerKey::Guest(token.to_string()))),
        None => Err(AppError::Auth(format!(
          "Either {USER_HEADER} or {GUEST_HEADER} is required."
        ))),
      },
    };
    ready(result)
  }
}

/// A signed-in user who is also a configured administrator.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser {
  pub user_id: Uuid,
}

fn admin_from(req: &HttpRequest) -> Result<AdminUser, AppError> {
  let user_id = match user_id(req) {
    Some(parsed) => parsed?,
    None => return Err(AppError::Auth(format!("Administrator authentication required ({USER_HEADER})."))),
  };
  let app_state = req
    .app_data::<web::Data<AppState>>()
    .ok_or_else(|| AppError::Internal("application state is not registered".to_string()))?;
  if !app_state.config.is_admin(user_id) {
    warn!(%user_id, "Non-administrator attempted an administrative action.");
    return Err(AppError::Forbidden("Administrator role required.".to_string()));
  }
  Ok(AdminUser { user_id })
}

impl FromRequest for AdminUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(admin_from(req))
  }
}
