// storefront/src/web/routes.rs

use actix_web::web;

use crate::errors::AppError;
use crate::web::handlers::{cart_handlers, checkout_handlers, order_handlers, product_handlers, workshop_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()))
    .route("/health", web::get().to(health_check_handler))
    .service(
      web::scope("/cart")
        .route("", web::get().to(cart_handlers::get_cart_handler))
        .route("/add", web::post().to(cart_handlers::add_to_cart_handler))
        .route("/update", web::patch().to(cart_handlers::update_cart_handler))
        .route("/remove", web::delete().to(cart_handlers::remove_from_cart_handler))
        .route("/merge", web::post().to(cart_handlers::merge_cart_handler))
        .route("/clear", web::delete().to(cart_handlers::clear_cart_handler))
        .route("/totals", web::get().to(cart_handlers::cart_totals_handler)),
    )
    .service(
      web::scope("/checkout")
        .route("", web::post().to(checkout_handlers::start_checkout_handler))
        .route("/verify", web::post().to(checkout_handlers::verify_checkout_handler)),
    )
    .service(
      web::scope("/workshops")
        .route("/checkout", web::post().to(workshop_handlers::workshop_checkout_handler))
        .route("/verify", web::post().to(workshop_handlers::verify_workshop_handler))
        .route("/sessions/{session_id}", web::get().to(workshop_handlers::get_session_handler)),
    )
    .service(
      web::scope("/orders")
        .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
        .route("/{order_id}/status", web::post().to(order_handlers::update_order_status_handler)),
    )
    .service(
      web::scope("/products")
        .route("", web::get().to(product_handlers::list_products_handler))
        .route("/{product_id}", web::get().to(product_handlers::get_product_handler)),
    );
}
