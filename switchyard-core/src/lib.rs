//! Switchyard Core
//!
//! Core library for driving long-running remote workflows against a cloud
//! control plane: resource values, the provider trait, schema validation,
//! and the deadline/wait/retry primitives every provider builds on.

pub mod deadline;
pub mod diagnostic;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod utils;
pub mod wait;
