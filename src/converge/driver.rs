//! The convergence driver.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::audit::AuditLogger;
use crate::config::Settings;
use crate::error::ConvergeResult;
use crate::host::Host;
use crate::packages::{provisioner_for, InstallStrategy, PlatformFamily};
use crate::services::{RabbitmqService, ServiceDefinition, ServiceDescriptor};
use crate::templates::TemplateEngine;

use super::preconditions::check_preconditions;
use super::report::{Recorder, RunReport, Step};
use super::steps::{
    converge_cookie, ensure_enabled_and_running, install_packages, render_configs, StepContext,
};

/// What a run would act on, resolved without touching the host.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub platform: PlatformFamily,
    pub provisioner: &'static str,
    pub strategy: InstallStrategy,
    pub service: ServiceDescriptor,
    pub managed_files: Vec<PathBuf>,
    /// Present only when clustering.
    pub cookie_path: Option<PathBuf>,
}

/// Runs the converge steps for one node, in order, once.
pub struct Converger {
    settings: Settings,
    platform: PlatformFamily,
    templates: TemplateEngine,
    service: Box<dyn ServiceDefinition>,
    audit: Option<Arc<AuditLogger>>,
}

impl Converger {
    pub fn new(settings: Settings, platform: PlatformFamily, templates: TemplateEngine) -> Self {
        Self {
            settings,
            platform,
            templates,
            service: Box::new(RabbitmqService),
            audit: None,
        }
    }

    /// Journal every mutation to `logger`.
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Service commands for this node. Fails on the same preconditions as
    /// a run.
    pub fn descriptor(&self) -> ConvergeResult<ServiceDescriptor> {
        let node = &self.settings.rabbitmq;
        check_preconditions(node)?;
        Ok(ServiceDescriptor::build(
            self.service.name(),
            &self.settings.paths.init_script,
            node,
        ))
    }

    /// Resolve what a run would act on.
    pub fn plan(&self) -> ConvergeResult<Plan> {
        let descriptor = self.descriptor()?;
        let node = &self.settings.rabbitmq;
        let paths = &self.settings.paths;
        let provisioner = provisioner_for(&self.platform);

        Ok(Plan {
            platform: self.platform.clone(),
            provisioner: provisioner.name(),
            strategy: provisioner.strategy(node, paths, self.service.as_ref()),
            service: descriptor,
            managed_files: self
                .service
                .managed_configs()
                .iter()
                .map(|c| paths.config_dir.join(c.file_name))
                .collect(),
            cookie_path: node.cluster.then(|| node.erlang_cookie_path.clone()),
        })
    }

    /// Converge the host. Stops at the first failing step; nothing already
    /// applied is rolled back.
    pub fn run(&self, host: &mut dyn Host) -> ConvergeResult<RunReport> {
        let mut recorder = Recorder::new(self.audit.clone());

        info!(
            run_id = %recorder.run_id(),
            platform = %self.platform,
            service = %self.service.display_name(),
            "Starting convergence run"
        );

        match self.run_steps(host, &mut recorder) {
            Ok(()) => {
                let report = recorder.finish();
                info!(
                    run_id = %report.run_id,
                    changed = report.changed(),
                    mutations = report.entries.len(),
                    restarts = report.restarts(),
                    warnings = report.warnings.len(),
                    "Convergence run complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    run_id = %recorder.run_id(),
                    step = %recorder.current_step(),
                    error = %e,
                    "Convergence run failed"
                );
                recorder.fail(&e);
                Err(e)
            }
        }
    }

    fn run_steps(&self, host: &mut dyn Host, recorder: &mut Recorder) -> ConvergeResult<()> {
        recorder.begin_step(Step::Preconditions);
        let descriptor = self.descriptor()?;
        let provisioner = provisioner_for(&self.platform);

        let mut ctx = StepContext {
            host,
            node: &self.settings.rabbitmq,
            paths: &self.settings.paths,
            service: self.service.as_ref(),
            descriptor: &descriptor,
            templates: &self.templates,
            recorder,
        };

        ctx.recorder.begin_step(Step::Packages);
        install_packages(&mut ctx, provisioner.as_ref())?;

        ctx.recorder.begin_step(Step::Configuration);
        render_configs(&mut ctx)?;

        ctx.recorder.begin_step(Step::ClusterSecret);
        converge_cookie(&mut ctx)?;

        ctx.recorder.begin_step(Step::Enable);
        ensure_enabled_and_running(&mut ctx)
    }
}
