//! Debian family provisioner.

use tracing::{debug, info};

use crate::config::{AptRepositoryConfig, NodeConfig, PathsConfig};
use crate::converge::Mutation;
use crate::error::ConvergeResult;
use crate::host::{FileSpec, PackageFormat};
use crate::services::ServiceDefinition;

use super::artifact::artifact_for;
use super::traits::{InstallStrategy, PackageProvisioner, ProvisionContext};

/// Name of the vendor repository's sources list.
const REPOSITORY_NAME: &str = "rabbitmq";

/// Installs from the vendor apt repository, or from the vendor's .deb.
///
/// The vendor repository only carries the latest release, so no version
/// is pinned on that path.
pub struct DebianProvisioner;

/// The `deb` line registering the vendor repository.
pub fn apt_source_line(repo: &AptRepositoryConfig) -> String {
    format!(
        "deb {} {} {}\n",
        repo.uri,
        repo.distribution,
        repo.components.join(" ")
    )
}

impl DebianProvisioner {
    /// Register the vendor repository and its signing key.
    ///
    /// The key is fetched into the file cache and imported once; the
    /// package index is refreshed only when the sources list changed.
    fn ensure_vendor_repository(&self, ctx: &mut ProvisionContext<'_>) -> ConvergeResult<()> {
        let node: &NodeConfig = ctx.node;
        let repo = &node.apt;

        let key_name = repo
            .key
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("rabbitmq-signing-key.asc");
        let key_path = ctx.paths.file_cache_path.join(key_name);

        if ctx.ensure_cached(&repo.key, &key_path)? {
            info!(key = %repo.key, "Importing repository signing key");
            ctx.host.import_signing_key(&key_path)?;
            ctx.recorder.record(Mutation::ImportSigningKey {
                key: repo.key.clone(),
            });
        }

        let list_path = ctx
            .paths
            .apt_sources_dir
            .join(format!("{}.list", REPOSITORY_NAME));
        let line = apt_source_line(repo);
        let outcome = ctx.host.write_file(&FileSpec {
            path: &list_path,
            content: &line,
            owner: "root",
            group: "root",
            mode: 0o644,
        })?;
        ctx.recorder.record_write(&list_path, "root", "root", 0o644, outcome);

        if outcome.content_changed() {
            info!(repository = %repo.uri, "Repository registered, refreshing package index");
            ctx.host.refresh_package_index(PackageFormat::Deb)?;
            ctx.recorder.record(Mutation::RefreshPackageIndex {
                format: PackageFormat::Deb,
            });
        } else {
            debug!(repository = %repo.uri, "Repository already registered");
        }

        Ok(())
    }
}

impl PackageProvisioner for DebianProvisioner {
    fn name(&self) -> &'static str {
        "debian"
    }

    fn strategy(
        &self,
        node: &NodeConfig,
        paths: &PathsConfig,
        service: &dyn ServiceDefinition,
    ) -> InstallStrategy {
        let helpers: Vec<String> = service
            .helper_packages()
            .into_iter()
            .map(str::to_string)
            .collect();

        if node.use_apt {
            let mut packages = helpers;
            packages.push(service.package_name().to_string());
            InstallStrategy::Repository {
                format: PackageFormat::Deb,
                packages,
                vendor_repository: (!node.use_distro_version)
                    .then(|| apt_source_line(&node.apt).trim_end().to_string()),
            }
        } else {
            InstallStrategy::Artifact {
                helper_packages: helpers,
                artifact: artifact_for(service.package_name(), node, paths, PackageFormat::Deb),
            }
        }
    }

    fn ensure_installed(&self, ctx: &mut ProvisionContext<'_>) -> ConvergeResult<()> {
        for helper in ctx.service.helper_packages() {
            ctx.ensure_package(PackageFormat::Deb, helper)?;
        }

        if ctx.node.use_apt {
            if ctx.node.use_distro_version {
                debug!("Using the distribution's package, vendor repository not registered");
            } else {
                self.ensure_vendor_repository(ctx)?;
            }
            return ctx.ensure_package(PackageFormat::Deb, ctx.service.package_name());
        }

        let artifact = artifact_for(
            ctx.service.package_name(),
            ctx.node,
            ctx.paths,
            PackageFormat::Deb,
        );
        ctx.ensure_artifact(&artifact)
    }
}
