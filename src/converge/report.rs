//! Run report and mutation recorder.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger};
use crate::error::ConvergeError;
use crate::host::{PackageFormat, WriteOutcome};
use crate::services::ServiceAction;

/// Converge steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Preconditions,
    Packages,
    Configuration,
    ClusterSecret,
    Enable,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Preconditions => "preconditions",
            Step::Packages => "packages",
            Step::Configuration => "configuration",
            Step::ClusterSecret => "cluster_secret",
            Step::Enable => "enable",
        };
        f.write_str(name)
    }
}

/// A change applied to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    InstallPackage {
        package: String,
        format: PackageFormat,
    },
    Download {
        url: String,
        path: PathBuf,
    },
    InstallArtifact {
        package: String,
        version: String,
        path: PathBuf,
    },
    ImportSigningKey {
        key: String,
    },
    WriteFile {
        path: PathBuf,
        owner: String,
        group: String,
        /// Octal, e.g. `0644`.
        mode: String,
        outcome: WriteOutcome,
    },
    RefreshPackageIndex {
        format: PackageFormat,
    },
    Service {
        service: String,
        action: ServiceAction,
    },
}

/// A mutation and the step that applied it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub step: Step,
    #[serde(flatten)]
    pub mutation: Mutation,
}

/// What one run did to the host.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub entries: Vec<ReportEntry>,
    pub warnings: Vec<String>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entries: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Whether the run changed anything.
    pub fn changed(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Mutations in the order they were applied.
    pub fn mutations(&self) -> impl Iterator<Item = &Mutation> {
        self.entries.iter().map(|e| &e.mutation)
    }

    /// Service actions issued, in order.
    pub fn service_actions(&self) -> Vec<ServiceAction> {
        self.mutations()
            .filter_map(|m| match m {
                Mutation::Service { action, .. } => Some(*action),
                _ => None,
            })
            .collect()
    }

    /// Number of restarts issued.
    pub fn restarts(&self) -> usize {
        self.service_actions()
            .into_iter()
            .filter(|a| *a == ServiceAction::Restart)
            .count()
    }
}

/// Collects the run report and mirrors each mutation to the audit journal.
pub struct Recorder {
    report: RunReport,
    audit: Option<Arc<AuditLogger>>,
    step: Step,
}

impl Recorder {
    pub fn new(audit: Option<Arc<AuditLogger>>) -> Self {
        Self {
            report: RunReport::new(),
            audit,
            step: Step::Preconditions,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.report.run_id
    }

    /// Step subsequent mutations are attributed to.
    pub fn begin_step(&mut self, step: Step) {
        self.step = step;
    }

    pub fn current_step(&self) -> Step {
        self.step
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Record an applied mutation.
    pub fn record(&mut self, mutation: Mutation) {
        if let Some(logger) = &self.audit {
            match serde_json::to_value(&mutation) {
                Ok(value) => {
                    let entry =
                        AuditEntry::applied(self.report.run_id, &self.step.to_string(), value);
                    if let Err(e) = logger.log(&entry) {
                        error!(error = %e, "Failed to write audit log entry");
                    }
                }
                Err(e) => error!(error = %e, "Failed to serialize mutation for audit log"),
            }
        }

        self.report.entries.push(ReportEntry {
            step: self.step,
            mutation,
        });
    }

    /// Record a file write unless it left the file untouched.
    pub fn record_write(
        &mut self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: u32,
        outcome: WriteOutcome,
    ) {
        if outcome == WriteOutcome::Unchanged {
            return;
        }
        info!(
            path = %path.display(),
            owner = %owner,
            mode = %format!("{:04o}", mode),
            outcome = ?outcome,
            "File converged"
        );
        self.record(Mutation::WriteFile {
            path: path.to_path_buf(),
            owner: owner.to_string(),
            group: group.to_string(),
            mode: format!("{:04o}", mode),
            outcome,
        });
    }

    /// Note a condition the operator should see in the summary.
    pub fn warn(&mut self, message: String) {
        self.report.warnings.push(message);
    }

    /// Journal the error that ended the run.
    pub fn fail(&self, err: &ConvergeError) {
        if let Some(logger) = &self.audit {
            let entry = AuditEntry::failed(
                self.report.run_id,
                &self.step.to_string(),
                err.code(),
                err.to_string(),
            );
            if let Err(e) = logger.log(&entry) {
                error!(error = %e, "Failed to write audit log entry");
            }
        }
    }

    /// Hand back the finished report.
    pub fn finish(self) -> RunReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unchanged_write_not_recorded() {
        let mut recorder = Recorder::new(None);
        recorder.record_write(
            Path::new("/etc/rabbitmq/rabbitmq.config"),
            "root",
            "root",
            0o644,
            WriteOutcome::Unchanged,
        );
        assert!(!recorder.report().changed());

        recorder.record_write(
            Path::new("/etc/rabbitmq/rabbitmq.config"),
            "root",
            "root",
            0o644,
            WriteOutcome::MetadataUpdated,
        );
        let report = recorder.finish();
        assert!(report.changed());
        match &report.entries[0].mutation {
            Mutation::WriteFile { mode, .. } => assert_eq!(mode, "0644"),
            other => panic!("unexpected mutation {:?}", other),
        }
    }

    #[test]
    fn test_restart_count_and_steps() {
        let mut recorder = Recorder::new(None);
        recorder.begin_step(Step::Configuration);
        recorder.record(Mutation::Service {
            service: "rabbitmq-server".to_string(),
            action: ServiceAction::Restart,
        });
        recorder.begin_step(Step::Enable);
        recorder.record(Mutation::Service {
            service: "rabbitmq-server".to_string(),
            action: ServiceAction::Start,
        });

        let report = recorder.finish();
        assert_eq!(report.restarts(), 1);
        assert_eq!(
            report.service_actions(),
            vec![ServiceAction::Restart, ServiceAction::Start]
        );
        assert_eq!(report.entries[0].step, Step::Configuration);
        assert_eq!(report.entries[1].step, Step::Enable);
    }

    #[test]
    fn test_mutations_journaled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let logger = Arc::new(AuditLogger::new(&path).unwrap());

        let mut recorder = Recorder::new(Some(logger));
        recorder.begin_step(Step::Packages);
        recorder.record(Mutation::InstallPackage {
            package: "rabbitmq-server".to_string(),
            format: PackageFormat::Deb,
        });
        recorder.fail(&ConvergeError::execution_failed("dpkg exploded"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["step"], "packages");
        assert_eq!(lines[0]["mutation"]["type"], "install_package");
        assert_eq!(lines[0]["mutation"]["format"], "deb");
        assert_eq!(lines[1]["result"]["error_code"], "COMMAND_FAILED");
    }

    #[test]
    fn test_report_serialization_flattens_mutation() {
        let mut recorder = Recorder::new(None);
        recorder.begin_step(Step::ClusterSecret);
        recorder.record(Mutation::Service {
            service: "rabbitmq-server".to_string(),
            action: ServiceAction::Stop,
        });
        let json = serde_json::to_value(recorder.report()).unwrap();
        assert_eq!(json["entries"][0]["step"], "cluster_secret");
        assert_eq!(json["entries"][0]["type"], "service");
        assert_eq!(json["entries"][0]["action"], "stop");
    }
}
