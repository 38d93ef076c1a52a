// storefront/src/lib.rs

//! Atelier storefront: carts, stock and seat reservations, and payment-gated
//! orders and workshop registrations.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;
