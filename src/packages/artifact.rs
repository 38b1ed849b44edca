//! Vendor release artifacts.

use crate::config::{NodeConfig, PathsConfig};
use crate::host::{Artifact, PackageFormat};

/// File name of the release package for `package` at `version`.
pub fn artifact_file_name(package: &str, version: &str, format: PackageFormat) -> String {
    match format {
        PackageFormat::Deb => format!("{}_{}-1_all.deb", package, version),
        PackageFormat::Rpm => format!("{}-{}-1.noarch.rpm", package, version),
    }
}

/// Download URL of the release package.
pub fn artifact_url(base: &str, package: &str, version: &str, format: PackageFormat) -> String {
    format!(
        "{}/{}/v{}/{}",
        base.trim_end_matches('/'),
        package,
        version,
        artifact_file_name(package, version, format)
    )
}

/// The pinned artifact for the configured broker version, cached under
/// the file cache path.
pub fn artifact_for(
    package: &str,
    node: &NodeConfig,
    paths: &PathsConfig,
    format: PackageFormat,
) -> Artifact {
    let file_name = artifact_file_name(package, &node.version, format);
    Artifact {
        package: package.to_string(),
        version: node.version.clone(),
        format,
        url: artifact_url(&node.release_base_url, package, &node.version, format),
        path: paths.file_cache_path.join(file_name),
    }
}
