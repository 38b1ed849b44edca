//! Error types for rabbitmq-converge.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
