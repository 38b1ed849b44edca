//! Service definitions module.
//!
//! Describes the managed broker service, builds the command strings used to
//! supervise it, and probes its liveness from the pid file.

mod descriptor;
mod rabbitmq;
mod status;
mod traits;

pub use descriptor::{shell_quote, ServiceAction, ServiceDescriptor, READINESS_TIMEOUT_SECS};
pub use rabbitmq::{RabbitmqService, ERLANG_COOKIE_TEMPLATE};
pub use status::{probe_pid_file, ServiceStatus};
pub use traits::{ManagedConfig, ServiceDefinition};
