//! Audit journal module.
//!
//! Records every mutation a convergence run applies to the host, and the
//! error that ended a failed run, as JSON lines.

mod entry;
mod logger;

pub use entry::{AuditEntry, AuditResult};
pub use logger::AuditLogger;
