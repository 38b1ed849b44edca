//! Package provisioner trait and shared install helpers.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{NodeConfig, PathsConfig};
use crate::converge::{Mutation, Recorder};
use crate::error::ConvergeResult;
use crate::host::{Artifact, Host, PackageFormat};
use crate::services::ServiceDefinition;
use crate::validation::validate_package_name;

/// How the broker package will be installed, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum InstallStrategy {
    /// Install by name through the package manager.
    Repository {
        format: PackageFormat,
        packages: Vec<String>,
        /// Vendor repository registered first, if any.
        vendor_repository: Option<String>,
    },
    /// Download a pinned package file and install it.
    Artifact {
        helper_packages: Vec<String>,
        artifact: Artifact,
    },
    /// No install method for this platform.
    Unsupported { platform: String },
}

/// Everything a provisioner needs during a run.
pub struct ProvisionContext<'a> {
    pub host: &'a mut dyn Host,
    pub node: &'a NodeConfig,
    pub paths: &'a PathsConfig,
    pub service: &'a dyn ServiceDefinition,
    pub recorder: &'a mut Recorder,
}

impl ProvisionContext<'_> {
    /// Install a package by name unless some version is already installed.
    pub fn ensure_package(&mut self, format: PackageFormat, name: &str) -> ConvergeResult<()> {
        validate_package_name(name)?;

        if let Some(version) = self.host.installed_version(format, name)? {
            debug!(package = %name, version = %version, "Package already installed");
            return Ok(());
        }

        info!(package = %name, format = %format, "Installing package");
        self.host.install_package(format, name)?;
        self.recorder.record(Mutation::InstallPackage {
            package: name.to_string(),
            format,
        });
        Ok(())
    }

    /// Download `url` to `path` unless the file is already there.
    pub fn ensure_cached(&mut self, url: &str, path: &std::path::Path) -> ConvergeResult<bool> {
        if self.host.file_exists(path) {
            debug!(path = %path.display(), "Already cached, skipping download");
            return Ok(false);
        }

        self.host.download(url, path)?;
        self.recorder.record(Mutation::Download {
            url: url.to_string(),
            path: path.to_path_buf(),
        });
        Ok(true)
    }

    /// Fetch a pinned artifact into the cache and install it unless that
    /// exact version is already installed.
    pub fn ensure_artifact(&mut self, artifact: &Artifact) -> ConvergeResult<()> {
        self.ensure_cached(&artifact.url, &artifact.path)?;

        let wanted = artifact.installed_version();
        let installed = self
            .host
            .installed_version(artifact.format, &artifact.package)?;
        if installed.as_deref() == Some(wanted.as_str()) {
            debug!(
                package = %artifact.package,
                version = %wanted,
                "Pinned version already installed"
            );
            return Ok(());
        }

        info!(
            package = %artifact.package,
            version = %wanted,
            installed = ?installed,
            path = %artifact.path.display(),
            "Installing package file"
        );
        self.host.install_artifact(artifact)?;
        self.recorder.record(Mutation::InstallArtifact {
            package: artifact.package.clone(),
            version: artifact.version.clone(),
            path: artifact.path.clone(),
        });
        Ok(())
    }
}

/// Converges the broker package for one platform family.
pub trait PackageProvisioner {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// The install method this provisioner will use, without touching the host.
    fn strategy(
        &self,
        node: &NodeConfig,
        paths: &PathsConfig,
        service: &dyn ServiceDefinition,
    ) -> InstallStrategy;

    /// Ensure the broker package is installed.
    fn ensure_installed(&self, ctx: &mut ProvisionContext<'_>) -> ConvergeResult<()>;
}
