//! In-memory host.
//!
//! Simulates files, installed packages and service state, and records every
//! mutation in order, making it easy to write deterministic tests for the
//! converge steps.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ConvergeError, ConvergeResult};
use crate::services::{ServiceAction, ServiceDescriptor};

use super::{Artifact, FileSpec, Host, PackageFormat, WriteOutcome};

/// Version reported for packages installed by name.
const REPOSITORY_VERSION: &str = "latest";

/// A file held by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    pub content: String,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

/// A mutation applied to a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    WriteFile {
        path: PathBuf,
        owner: String,
        group: String,
        mode: u32,
        outcome: WriteOutcome,
    },
    Download {
        url: String,
        dest: PathBuf,
    },
    InstallPackage {
        format: PackageFormat,
        name: String,
    },
    InstallArtifact {
        path: PathBuf,
    },
    ImportSigningKey {
        key_file: PathBuf,
    },
    RefreshPackageIndex {
        format: PackageFormat,
    },
    Service {
        action: ServiceAction,
    },
}

/// A test-double host that records mutations.
#[derive(Debug, Default)]
pub struct MemoryHost {
    /// Files on the simulated machine.
    pub files: BTreeMap<PathBuf, MemoryFile>,
    /// Installed packages and their versions.
    pub packages: BTreeMap<String, String>,
    /// Whether the broker is running.
    pub running: bool,
    /// Whether the broker starts at boot.
    pub enabled: bool,
    /// Packages whose installation fails.
    pub failing_packages: Vec<String>,
    /// Mutations, in the order they were applied.
    pub events: Vec<HostEvent>,
    reads: RefCell<Vec<PathBuf>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a file.
    pub fn with_file(mut self, path: &str, content: &str, owner: &str, mode: u32) -> Self {
        self.files.insert(
            PathBuf::from(path),
            MemoryFile {
                content: content.to_string(),
                owner: owner.to_string(),
                group: owner.to_string(),
                mode,
            },
        );
        self
    }

    /// Pre-load an installed package.
    pub fn with_package(mut self, name: &str, version: &str) -> Self {
        self.packages.insert(name.to_string(), version.to_string());
        self
    }

    /// Make installs of `name` fail.
    pub fn with_failing_package(mut self, name: &str) -> Self {
        self.failing_packages.push(name.to_string());
        self
    }

    /// Start with the broker running.
    pub fn running(mut self) -> Self {
        self.running = true;
        self
    }

    /// Paths read through [`Host::read_file`].
    pub fn reads(&self) -> Vec<PathBuf> {
        self.reads.borrow().clone()
    }

    /// Clear recorded events and reads, keeping state.
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.reads.borrow_mut().clear();
    }

    /// Service actions recorded so far.
    pub fn service_actions(&self) -> Vec<ServiceAction> {
        self.events
            .iter()
            .filter_map(|e| match e {
                HostEvent::Service { action } => Some(*action),
                _ => None,
            })
            .collect()
    }

    fn check_installable(&self, name: &str) -> ConvergeResult<()> {
        if self.failing_packages.iter().any(|p| p == name) {
            return Err(ConvergeError::execution_failed(format!(
                "install of {} failed",
                name
            )));
        }
        Ok(())
    }
}

impl Host for MemoryHost {
    fn read_file(&self, path: &Path) -> ConvergeResult<Option<String>> {
        self.reads.borrow_mut().push(path.to_path_buf());
        Ok(self.files.get(path).map(|f| f.content.clone()))
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn write_file(&mut self, spec: &FileSpec<'_>) -> ConvergeResult<WriteOutcome> {
        let desired = MemoryFile {
            content: spec.content.to_string(),
            owner: spec.owner.to_string(),
            group: spec.group.to_string(),
            mode: spec.mode,
        };

        let outcome = match self.files.get(spec.path) {
            Some(existing) if *existing == desired => WriteOutcome::Unchanged,
            Some(existing) if existing.content == desired.content => WriteOutcome::MetadataUpdated,
            _ => WriteOutcome::ContentWritten,
        };

        if outcome != WriteOutcome::Unchanged {
            self.files.insert(spec.path.to_path_buf(), desired);
            self.events.push(HostEvent::WriteFile {
                path: spec.path.to_path_buf(),
                owner: spec.owner.to_string(),
                group: spec.group.to_string(),
                mode: spec.mode,
                outcome,
            });
        }

        Ok(outcome)
    }

    fn download(&mut self, url: &str, dest: &Path) -> ConvergeResult<()> {
        self.files.insert(
            dest.to_path_buf(),
            MemoryFile {
                content: format!("downloaded from {}", url),
                owner: "root".to_string(),
                group: "root".to_string(),
                mode: 0o644,
            },
        );
        self.events.push(HostEvent::Download {
            url: url.to_string(),
            dest: dest.to_path_buf(),
        });
        Ok(())
    }

    fn installed_version(
        &self,
        _format: PackageFormat,
        name: &str,
    ) -> ConvergeResult<Option<String>> {
        Ok(self.packages.get(name).cloned())
    }

    fn install_package(&mut self, format: PackageFormat, name: &str) -> ConvergeResult<()> {
        self.check_installable(name)?;
        self.packages
            .insert(name.to_string(), REPOSITORY_VERSION.to_string());
        self.events.push(HostEvent::InstallPackage {
            format,
            name: name.to_string(),
        });
        Ok(())
    }

    fn install_artifact(&mut self, artifact: &Artifact) -> ConvergeResult<()> {
        if !self.files.contains_key(&artifact.path) {
            return Err(ConvergeError::execution_failed(format!(
                "package file {} not found",
                artifact.path.display()
            )));
        }
        self.check_installable(&artifact.package)?;
        self.packages
            .insert(artifact.package.clone(), artifact.installed_version());
        self.events.push(HostEvent::InstallArtifact {
            path: artifact.path.clone(),
        });
        Ok(())
    }

    fn import_signing_key(&mut self, key_file: &Path) -> ConvergeResult<()> {
        self.events.push(HostEvent::ImportSigningKey {
            key_file: key_file.to_path_buf(),
        });
        Ok(())
    }

    fn refresh_package_index(&mut self, format: PackageFormat) -> ConvergeResult<()> {
        self.events.push(HostEvent::RefreshPackageIndex { format });
        Ok(())
    }

    fn service_running(&self, _service: &ServiceDescriptor) -> ConvergeResult<bool> {
        Ok(self.running)
    }

    fn service_enabled(&self, _service: &ServiceDescriptor) -> ConvergeResult<bool> {
        Ok(self.enabled)
    }

    fn service_action(
        &mut self,
        _service: &ServiceDescriptor,
        action: ServiceAction,
    ) -> ConvergeResult<()> {
        match action {
            ServiceAction::Start | ServiceAction::Restart => self.running = true,
            ServiceAction::Stop => self.running = false,
            ServiceAction::Enable => self.enabled = true,
        }
        self.events.push(HostEvent::Service { action });
        Ok(())
    }
}
