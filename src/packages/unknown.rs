//! Fallback for platform families without an install method.

use tracing::warn;

use crate::config::{NodeConfig, PathsConfig};
use crate::error::ConvergeResult;
use crate::services::ServiceDefinition;

use super::traits::{InstallStrategy, PackageProvisioner, ProvisionContext};

/// Installs nothing, and says so.
pub struct UnknownProvisioner {
    platform: String,
}

impl UnknownProvisioner {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
        }
    }
}

impl PackageProvisioner for UnknownProvisioner {
    fn name(&self) -> &'static str {
        "unknown"
    }

    fn strategy(
        &self,
        _node: &NodeConfig,
        _paths: &PathsConfig,
        _service: &dyn ServiceDefinition,
    ) -> InstallStrategy {
        InstallStrategy::Unsupported {
            platform: self.platform.clone(),
        }
    }

    fn ensure_installed(&self, ctx: &mut ProvisionContext<'_>) -> ConvergeResult<()> {
        warn!(
            platform = %self.platform,
            package = %ctx.service.package_name(),
            "No install method for this platform family; package must be installed out of band"
        );
        ctx.recorder.warn(format!(
            "platform '{}' is not supported; {} was not installed",
            self.platform,
            ctx.service.package_name()
        ));
        Ok(())
    }
}
