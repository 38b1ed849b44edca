//! Red Hat family provisioner.

use crate::config::{NodeConfig, PathsConfig};
use crate::error::ConvergeResult;
use crate::host::PackageFormat;
use crate::services::ServiceDefinition;

use super::artifact::artifact_for;
use super::traits::{InstallStrategy, PackageProvisioner, ProvisionContext};

/// Installs through yum, or from the vendor's noarch rpm.
pub struct RpmProvisioner;

impl PackageProvisioner for RpmProvisioner {
    fn name(&self) -> &'static str {
        "rpm"
    }

    fn strategy(
        &self,
        node: &NodeConfig,
        paths: &PathsConfig,
        service: &dyn ServiceDefinition,
    ) -> InstallStrategy {
        if node.use_yum {
            InstallStrategy::Repository {
                format: PackageFormat::Rpm,
                packages: vec![service.package_name().to_string()],
                vendor_repository: None,
            }
        } else {
            InstallStrategy::Artifact {
                helper_packages: Vec::new(),
                artifact: artifact_for(service.package_name(), node, paths, PackageFormat::Rpm),
            }
        }
    }

    fn ensure_installed(&self, ctx: &mut ProvisionContext<'_>) -> ConvergeResult<()> {
        if ctx.node.use_yum {
            return ctx.ensure_package(PackageFormat::Rpm, ctx.service.package_name());
        }

        let artifact = artifact_for(
            ctx.service.package_name(),
            ctx.node,
            ctx.paths,
            PackageFormat::Rpm,
        );
        ctx.ensure_artifact(&artifact)
    }
}
