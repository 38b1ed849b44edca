//! Configuration module for rabbitmq-converge.
//!
//! Handles loading and validating node configuration from TOML files.

mod settings;

pub use settings::*;
