//! Command executor module.
//!
//! Spawns host commands with timeouts and trims their output for error messages.

mod output;
mod subprocess;

pub use output::sanitize_output;
pub use subprocess::{
    run_command, run_command_with_env, run_service_script, run_shell, SubprocessBuilder,
    SubprocessResult,
};
