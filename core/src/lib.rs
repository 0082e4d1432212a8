// core/src/lib.rs

//! Stepflow: asynchronous, type-safe step pipelines.
//!
//! A pipeline is an ordered list of named steps. Each step carries `before`,
//! `on` and `after` handlers that operate on a shared [`ContextData`] and
//! decide whether the run continues or stops. Steps can be optional (their
//! failures are logged and swallowed) or skipped through a condition evaluated
//! against the context.
//!
//! The storefront uses one pipeline per business flow (checkout, payment
//! confirmation) and dispatches them through a [`Registry`] keyed by the
//! context data type.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context::Handler;
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::Registry;
