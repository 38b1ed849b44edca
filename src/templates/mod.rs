//! Template rendering module.
//!
//! Renders the broker's configuration files and Erlang cookie with Tera.

mod context;
mod engine;

pub use context::node_context;
pub use engine::TemplateEngine;
