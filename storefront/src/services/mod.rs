// storefront/src/services/mod.rs

pub mod booking;
pub mod cart;
pub mod gateway;
pub mod lifecycle;
pub mod notifier;
pub mod payment_gate;
pub mod pricing;
pub mod seed;
pub mod stock_ledger;
pub mod sweep;
