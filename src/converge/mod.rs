//! Convergence module.
//!
//! Drives the host toward the desired broker state through an ordered list
//! of idempotent steps:
//!
//! 1. preconditions: validate the node configuration, no host access
//! 2. packages: install the broker through the platform's provisioner
//! 3. configuration: render config files, restart once if content changed
//! 4. cluster secret: rotate the Erlang cookie when clustering
//! 5. enable: enable at boot and start

mod driver;
mod notify;
mod preconditions;
mod report;
mod steps;

pub use driver::{Converger, Plan};
pub use notify::PendingNotifications;
pub use preconditions::check_preconditions;
pub use report::{Mutation, Recorder, ReportEntry, RunReport, Step};
pub use steps::{
    apply_service_action, converge_cookie, ensure_enabled_and_running, install_packages,
    render_configs, StepContext,
};
