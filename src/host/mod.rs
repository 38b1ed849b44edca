//! Host abstraction.
//!
//! Every read and mutation the converge steps perform goes through the
//! [`Host`] trait. [`SystemHost`] acts on the real machine through package
//! managers, init scripts and the filesystem; [`MemoryHost`] simulates a
//! machine in memory and records what was done to it.

mod memory;
mod system;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ConvergeResult;
use crate::services::{ServiceAction, ServiceDescriptor};

pub use memory::{HostEvent, MemoryFile, MemoryHost};
pub use system::{InitSystem, SystemHost};

/// Package format handled by the host's package tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// apt-get / dpkg.
    Deb,
    /// yum / rpm.
    Rpm,
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageFormat::Deb => f.write_str("deb"),
            PackageFormat::Rpm => f.write_str("rpm"),
        }
    }
}

/// A version-pinned package file fetched from the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub package: String,
    pub version: String,
    pub format: PackageFormat,
    pub url: String,
    pub path: PathBuf,
}

impl Artifact {
    /// Installed version string this artifact produces (`{version}-1`).
    pub fn installed_version(&self) -> String {
        format!("{}-1", self.version)
    }
}

/// Desired state of a managed file.
#[derive(Debug, Clone)]
pub struct FileSpec<'a> {
    pub path: &'a Path,
    pub content: &'a str,
    pub owner: &'a str,
    pub group: &'a str,
    pub mode: u32,
}

/// What a file write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Content, owner, group and mode already matched.
    Unchanged,
    /// Content matched; owner, group or mode was corrected.
    MetadataUpdated,
    /// The file was created or its content replaced.
    ContentWritten,
}

impl WriteOutcome {
    /// Whether the content on disk changed.
    pub fn content_changed(&self) -> bool {
        matches!(self, WriteOutcome::ContentWritten)
    }
}

/// Operations the converge steps need from a machine.
///
/// Query methods take `&self`; mutations take `&mut self`. Implementations
/// report failures as errors and never retry.
pub trait Host {
    /// Read a file, `None` when it does not exist.
    fn read_file(&self, path: &Path) -> ConvergeResult<Option<String>>;

    /// Whether a file exists.
    fn file_exists(&self, path: &Path) -> bool;

    /// Bring a file to the given content, ownership and mode.
    fn write_file(&mut self, spec: &FileSpec<'_>) -> ConvergeResult<WriteOutcome>;

    /// Download `url` to `dest`. The destination only appears once the
    /// download is complete.
    fn download(&mut self, url: &str, dest: &Path) -> ConvergeResult<()>;

    /// Installed version of a package, `None` when not installed.
    fn installed_version(&self, format: PackageFormat, name: &str)
        -> ConvergeResult<Option<String>>;

    /// Install a package by name from the configured repositories.
    fn install_package(&mut self, format: PackageFormat, name: &str) -> ConvergeResult<()>;

    /// Install a downloaded package file.
    fn install_artifact(&mut self, artifact: &Artifact) -> ConvergeResult<()>;

    /// Trust a repository signing key stored at `key_file`.
    fn import_signing_key(&mut self, key_file: &Path) -> ConvergeResult<()>;

    /// Refresh the package index after a repository change.
    fn refresh_package_index(&mut self, format: PackageFormat) -> ConvergeResult<()>;

    /// Whether the service is running, per its status command.
    fn service_running(&self, service: &ServiceDescriptor) -> ConvergeResult<bool>;

    /// Whether the service starts at boot.
    fn service_enabled(&self, service: &ServiceDescriptor) -> ConvergeResult<bool>;

    /// Run a lifecycle action on the service.
    fn service_action(
        &mut self,
        service: &ServiceDescriptor,
        action: ServiceAction,
    ) -> ConvergeResult<()>;
}
