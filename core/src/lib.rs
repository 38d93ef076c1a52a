// src/lib.rs

//! Atelier Flow: asynchronous step pipelines for transactional workflows.
//!
//! A pipeline is an ordered list of named steps over one shared context. Each
//! step can carry `before`, `on` and `after` handlers, a skip condition and an
//! optional flag. Steps that finished may register compensation handlers: when
//! a later step fails, the compensations of every completed step run in
//! reverse order before the error is returned. This is how checkout releases
//! stock it reserved when the payment gateway refuses to open an order.
//!
//! Pipelines are registered in a [`FlowRegistry`] keyed by their context type
//! and dispatched with [`FlowRegistry::run`].

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};
pub use crate::error::{FlowError, FlowResult};
pub use crate::pipeline::definition::{Handler, Pipeline};
pub use crate::registry::FlowRegistry;
