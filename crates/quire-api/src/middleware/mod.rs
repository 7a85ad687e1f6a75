//! # Middleware Modules
//!
//! Tower middleware layers for the API service.

pub mod deadline;
pub mod error_log;
pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;
