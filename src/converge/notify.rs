//! Pending service notifications.

use tracing::debug;

use crate::error::ConvergeResult;
use crate::host::Host;
use crate::services::{ServiceAction, ServiceDescriptor};

use super::report::Recorder;
use super::steps::apply_service_action;

/// Restart requests raised by config writes within one step.
///
/// Requests coalesce: however many writes notify, a flush issues at most
/// one restart and clears the flag.
#[derive(Debug, Default)]
pub struct PendingNotifications {
    restart: bool,
}

impl PendingNotifications {
    pub fn notify_restart(&mut self) {
        self.restart = true;
    }

    /// Issue the pending restart, if any. Returns whether one was issued.
    pub fn flush(
        &mut self,
        host: &mut dyn Host,
        descriptor: &ServiceDescriptor,
        recorder: &mut Recorder,
    ) -> ConvergeResult<bool> {
        if !std::mem::take(&mut self.restart) {
            debug!(service = %descriptor.name, "No restart pending");
            return Ok(false);
        }

        apply_service_action(host, descriptor, ServiceAction::Restart, recorder)?;
        Ok(true)
    }
}
