//! RabbitMQ host convergence library.
//!
//! This crate provides the core functionality for converging a single host
//! toward a running, configured RabbitMQ broker: package provisioning,
//! config rendering, Erlang cookie rotation and service enablement.

pub mod audit;
pub mod config;
pub mod converge;
pub mod error;
pub mod executor;
pub mod host;
pub mod packages;
pub mod services;
pub mod templates;
pub mod validation;
