//! Converge steps.
//!
//! Each step compares the host against the desired state and changes only
//! what differs.

use tracing::{debug, info};

use crate::config::{NodeConfig, PathsConfig};
use crate::error::ConvergeResult;
use crate::host::{FileSpec, Host};
use crate::packages::{PackageProvisioner, ProvisionContext};
use crate::services::{ServiceAction, ServiceDefinition, ServiceDescriptor, ERLANG_COOKIE_TEMPLATE};
use crate::templates::{node_context, TemplateEngine};

use super::notify::PendingNotifications;
use super::report::{Mutation, Recorder};

/// Owner of the rendered config files.
const CONFIG_OWNER: &str = "root";
const CONFIG_MODE: u32 = 0o644;
/// The broker refuses to start with a group- or world-readable cookie.
const COOKIE_MODE: u32 = 0o400;

/// Everything a step reads or acts through.
pub struct StepContext<'a> {
    pub host: &'a mut dyn Host,
    pub node: &'a NodeConfig,
    pub paths: &'a PathsConfig,
    pub service: &'a dyn ServiceDefinition,
    pub descriptor: &'a ServiceDescriptor,
    pub templates: &'a TemplateEngine,
    pub recorder: &'a mut Recorder,
}

/// Run a service action and record it.
pub fn apply_service_action(
    host: &mut dyn Host,
    descriptor: &ServiceDescriptor,
    action: ServiceAction,
    recorder: &mut Recorder,
) -> ConvergeResult<()> {
    info!(service = %descriptor.name, action = %action, "Service action");
    host.service_action(descriptor, action)?;
    recorder.record(Mutation::Service {
        service: descriptor.name.clone(),
        action,
    });
    Ok(())
}

/// Install the broker package through the platform's provisioner.
pub fn install_packages(
    ctx: &mut StepContext<'_>,
    provisioner: &dyn PackageProvisioner,
) -> ConvergeResult<()> {
    debug!(provisioner = provisioner.name(), "Provisioning packages");
    let mut provision = ProvisionContext {
        host: &mut *ctx.host,
        node: ctx.node,
        paths: ctx.paths,
        service: ctx.service,
        recorder: &mut *ctx.recorder,
    };
    provisioner.ensure_installed(&mut provision)
}

/// Render the broker config files, restarting once if any content changed.
pub fn render_configs(ctx: &mut StepContext<'_>) -> ConvergeResult<()> {
    let context = node_context(ctx.node, ctx.paths);
    let mut pending = PendingNotifications::default();

    for config in ctx.service.managed_configs() {
        let path = ctx.paths.config_dir.join(config.file_name);
        let content = ctx.templates.render(config.template, &context)?;

        let outcome = ctx.host.write_file(&FileSpec {
            path: &path,
            content: &content,
            owner: CONFIG_OWNER,
            group: CONFIG_OWNER,
            mode: CONFIG_MODE,
        })?;
        ctx.recorder
            .record_write(&path, CONFIG_OWNER, CONFIG_OWNER, CONFIG_MODE, outcome);

        if outcome.content_changed() {
            pending.notify_restart();
        } else {
            debug!(path = %path.display(), outcome = ?outcome, "Config content unchanged");
        }
    }

    pending.flush(&mut *ctx.host, ctx.descriptor, &mut *ctx.recorder)?;
    Ok(())
}

/// Bring the Erlang cookie to the configured value when clustering.
///
/// A rotation stops the broker before the write and starts it after, since
/// a running node keeps the cookie it booted with.
pub fn converge_cookie(ctx: &mut StepContext<'_>) -> ConvergeResult<()> {
    if !ctx.node.cluster {
        debug!("Clustering disabled, cookie not managed");
        return Ok(());
    }

    let path = &ctx.node.erlang_cookie_path;
    let current = ctx.host.read_file(path)?.unwrap_or_default();
    let desired = ctx
        .templates
        .render(ERLANG_COOKIE_TEMPLATE, &node_context(ctx.node, ctx.paths))?;

    if current == desired {
        debug!(path = %path.display(), "Cookie matches");
        return Ok(());
    }

    info!(path = %path.display(), "Cookie differs, rotating");

    if ctx.host.service_running(ctx.descriptor)? {
        apply_service_action(
            &mut *ctx.host,
            ctx.descriptor,
            ServiceAction::Stop,
            &mut *ctx.recorder,
        )?;
    } else {
        debug!(service = %ctx.descriptor.name, "Service not running, no stop needed");
    }

    let owner = ctx.node.broker_user.as_str();
    let group = ctx.node.broker_group.as_str();
    let outcome = ctx.host.write_file(&FileSpec {
        path,
        content: &desired,
        owner,
        group,
        mode: COOKIE_MODE,
    })?;
    ctx.recorder
        .record_write(path, owner, group, COOKIE_MODE, outcome);

    apply_service_action(
        &mut *ctx.host,
        ctx.descriptor,
        ServiceAction::Start,
        &mut *ctx.recorder,
    )
}

/// Enable the service at boot and start it.
pub fn ensure_enabled_and_running(ctx: &mut StepContext<'_>) -> ConvergeResult<()> {
    if ctx.host.service_enabled(ctx.descriptor)? {
        debug!(service = %ctx.descriptor.name, "Already enabled");
    } else {
        apply_service_action(
            &mut *ctx.host,
            ctx.descriptor,
            ServiceAction::Enable,
            &mut *ctx.recorder,
        )?;
    }

    if ctx.host.service_running(ctx.descriptor)? {
        debug!(service = %ctx.descriptor.name, "Already running");
        Ok(())
    } else {
        apply_service_action(
            &mut *ctx.host,
            ctx.descriptor,
            ServiceAction::Start,
            &mut *ctx.recorder,
        )
    }
}
