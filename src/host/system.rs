//! Host implementation acting on the local machine.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{chown, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::error::{ConvergeError, ConvergeResult};
use crate::executor::{
    run_command, run_command_with_env, run_service_script, run_shell, sanitize_output,
    SubprocessResult,
};
use crate::services::{ServiceAction, ServiceDescriptor};
use crate::validation::{resolve_group, resolve_user};

use super::{Artifact, FileSpec, Host, PackageFormat, WriteOutcome};

/// Runlevel directory checked for sysv boot links.
const DEFAULT_RC_DIR: &str = "/etc/rc2.d";

/// Environment for non-interactive apt/dpkg runs.
const APT_ENV: &[(&str, &str)] = &[("DEBIAN_FRONTEND", "noninteractive")];

/// How boot-time enablement is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    /// `systemctl is-enabled` / `systemctl enable`.
    Systemd,
    /// sysv links managed with `update-rc.d` (Debian family).
    UpdateRcD,
    /// sysv links managed with `chkconfig` (Red Hat family).
    Chkconfig,
}

impl InitSystem {
    /// Detect the init system, using the package format to pick the sysv
    /// tooling when systemd is not running.
    pub fn detect(format: Option<PackageFormat>) -> Self {
        if Path::new("/run/systemd/system").is_dir() {
            InitSystem::Systemd
        } else if format == Some(PackageFormat::Rpm) {
            InitSystem::Chkconfig
        } else {
            InitSystem::UpdateRcD
        }
    }
}

/// Host backed by the real machine.
pub struct SystemHost {
    init: InitSystem,
    rc_dir: PathBuf,
    command_timeout: Duration,
    package_timeout: Duration,
    download_timeout: Duration,
}

impl SystemHost {
    pub fn new(limits: &LimitsConfig, init: InitSystem) -> Self {
        Self {
            init,
            rc_dir: PathBuf::from(DEFAULT_RC_DIR),
            command_timeout: Duration::from_secs(limits.command_timeout_seconds),
            package_timeout: Duration::from_secs(limits.package_timeout_seconds),
            download_timeout: Duration::from_secs(limits.download_timeout_seconds),
        }
    }

    /// Init system this host enables services with.
    pub fn init_system(&self) -> InitSystem {
        self.init
    }
}

/// Turn a non-zero exit into an execution error carrying trimmed stderr.
fn ensure_success(what: &str, result: SubprocessResult) -> ConvergeResult<SubprocessResult> {
    if result.success {
        return Ok(result);
    }
    warn!(
        command = %what,
        exit_code = ?result.exit_code,
        stderr = %sanitize_output(&result.stderr, 20),
        "Host command failed"
    );
    let exit = result
        .exit_code
        .map(|code| format!("exit code {}", code))
        .unwrap_or_else(|| "a signal".to_string());
    Err(ConvergeError::execution_failed(format!(
        "{} failed with {}: {}",
        what,
        exit,
        sanitize_output(&result.stderr, 5)
    )))
}

fn path_str(path: &Path) -> ConvergeResult<&str> {
    path.to_str().ok_or_else(|| {
        ConvergeError::execution_failed(format!("path {} is not valid UTF-8", path.display()))
    })
}

/// Sibling temp path with a random suffix, so a stale or planted file is
/// never reused.
fn temp_sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = format!(
        ".{}.{}.{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4().simple(),
        suffix
    );
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> ConvergeResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            debug!(path = %parent.display(), "Creating parent directory");
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl Host for SystemHost {
    fn read_file(&self, path: &Path) -> ConvergeResult<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn write_file(&mut self, spec: &FileSpec<'_>) -> ConvergeResult<WriteOutcome> {
        let uid = resolve_user(spec.owner)?;
        let gid = resolve_group(spec.group)?;

        let existing = match fs::read(spec.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if existing.as_deref() == Some(spec.content.as_bytes()) {
            let metadata = fs::metadata(spec.path)?;
            if metadata.uid() == uid
                && metadata.gid() == gid
                && metadata.mode() & 0o7777 == spec.mode
            {
                return Ok(WriteOutcome::Unchanged);
            }

            fs::set_permissions(spec.path, fs::Permissions::from_mode(spec.mode))?;
            chown(spec.path, Some(uid), Some(gid))?;
            info!(
                path = %spec.path.display(),
                mode = format!("{:o}", spec.mode),
                owner = %spec.owner,
                "File ownership and mode corrected"
            );
            return Ok(WriteOutcome::MetadataUpdated);
        }

        ensure_parent(spec.path)?;

        // Write to a temporary file first, then rename over the target
        let temp_path = temp_sibling(spec.path, "tmp");
        let write_result = (|| -> ConvergeResult<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(spec.content.as_bytes())?;
            file.sync_all()?;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(spec.mode))?;
            chown(&temp_path, Some(uid), Some(gid))?;
            fs::rename(&temp_path, spec.path)?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        info!(
            path = %spec.path.display(),
            bytes = spec.content.len(),
            mode = format!("{:o}", spec.mode),
            owner = %spec.owner,
            "File written"
        );
        Ok(WriteOutcome::ContentWritten)
    }

    fn download(&mut self, url: &str, dest: &Path) -> ConvergeResult<()> {
        ensure_parent(dest)?;
        let temp_path = temp_sibling(dest, "part");
        let temp_str = path_str(&temp_path)?;

        debug!(url = %url, dest = %dest.display(), "Downloading");

        let result = run_command(
            "curl",
            &["-fsSL", "--retry", "3", "-o", temp_str, url],
            self.download_timeout,
        );

        match result {
            Ok(r) if r.success => {
                fs::rename(&temp_path, dest)?;
                info!(url = %url, dest = %dest.display(), "Download complete");
                Ok(())
            }
            Ok(r) => {
                let _ = fs::remove_file(&temp_path);
                Err(ConvergeError::Download {
                    url: url.to_string(),
                    message: sanitize_output(&r.stderr, 5),
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    fn installed_version(
        &self,
        format: PackageFormat,
        name: &str,
    ) -> ConvergeResult<Option<String>> {
        match format {
            PackageFormat::Deb => {
                let result = run_command(
                    "dpkg-query",
                    &["-W", "-f=${Status} ${Version}", name],
                    self.command_timeout,
                )?;
                if !result.success {
                    return Ok(None);
                }
                Ok(result
                    .stdout
                    .trim()
                    .strip_prefix("install ok installed ")
                    .map(|v| v.to_string()))
            }
            PackageFormat::Rpm => {
                let result = run_command(
                    "rpm",
                    &["-q", "--qf", "%{VERSION}-%{RELEASE}", name],
                    self.command_timeout,
                )?;
                if !result.success {
                    return Ok(None);
                }
                Ok(Some(result.stdout.trim().to_string()))
            }
        }
    }

    fn install_package(&mut self, format: PackageFormat, name: &str) -> ConvergeResult<()> {
        let result = match format {
            PackageFormat::Deb => run_command_with_env(
                "apt-get",
                &[
                    "install",
                    "-y",
                    "-o",
                    "Dpkg::Options::=--force-confdef",
                    "-o",
                    "Dpkg::Options::=--force-confold",
                    name,
                ],
                APT_ENV,
                self.package_timeout,
            )?,
            PackageFormat::Rpm => {
                run_command("yum", &["install", "-y", name], self.package_timeout)?
            }
        };
        ensure_success(&format!("install of {}", name), result)?;
        Ok(())
    }

    fn install_artifact(&mut self, artifact: &Artifact) -> ConvergeResult<()> {
        let path = path_str(&artifact.path)?;
        let result = match artifact.format {
            PackageFormat::Deb => {
                run_command_with_env("dpkg", &["-i", path], APT_ENV, self.package_timeout)?
            }
            PackageFormat::Rpm => run_command("rpm", &["-Uvh", path], self.package_timeout)?,
        };
        ensure_success(&format!("install of {}", artifact.path.display()), result)?;
        Ok(())
    }

    fn import_signing_key(&mut self, key_file: &Path) -> ConvergeResult<()> {
        let result = run_command("apt-key", &["add", path_str(key_file)?], self.command_timeout)?;
        ensure_success("apt-key add", result)?;
        Ok(())
    }

    fn refresh_package_index(&mut self, format: PackageFormat) -> ConvergeResult<()> {
        let result = match format {
            PackageFormat::Deb => {
                run_command_with_env("apt-get", &["update"], APT_ENV, self.package_timeout)?
            }
            PackageFormat::Rpm => run_command("yum", &["makecache"], self.package_timeout)?,
        };
        ensure_success("package index refresh", result)?;
        Ok(())
    }

    fn service_running(&self, service: &ServiceDescriptor) -> ConvergeResult<bool> {
        let result = run_shell(&service.status, self.command_timeout)?;
        debug!(
            service = %service.name,
            running = result.success,
            output = %result.stdout.trim(),
            "Service status checked"
        );
        Ok(result.success)
    }

    fn service_enabled(&self, service: &ServiceDescriptor) -> ConvergeResult<bool> {
        match self.init {
            InitSystem::Systemd => {
                let result =
                    run_command("systemctl", &["is-enabled", service.name.as_str()], self.command_timeout)?;
                Ok(result.success)
            }
            InitSystem::UpdateRcD => {
                let entries = match fs::read_dir(&self.rc_dir) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
                    Err(e) => return Err(e.into()),
                };
                for entry in entries {
                    let name = entry?.file_name();
                    let name = name.to_string_lossy();
                    if name.starts_with('S') && name.ends_with(service.name.as_str()) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            InitSystem::Chkconfig => {
                let result =
                    run_command("chkconfig", &["--list", service.name.as_str()], self.command_timeout)?;
                Ok(result.success && result.stdout.contains("3:on"))
            }
        }
    }

    fn service_action(
        &mut self,
        service: &ServiceDescriptor,
        action: ServiceAction,
    ) -> ConvergeResult<()> {
        let result = match (action, service.command_for(action)) {
            (_, Some(command)) => run_service_script(command, self.command_timeout)?,
            (ServiceAction::Enable, None) => match self.init {
                InitSystem::Systemd => {
                    run_command("systemctl", &["enable", service.name.as_str()], self.command_timeout)?
                }
                InitSystem::UpdateRcD => run_command(
                    "update-rc.d",
                    &[service.name.as_str(), "defaults"],
                    self.command_timeout,
                )?,
                InitSystem::Chkconfig => {
                    run_command("chkconfig", &[service.name.as_str(), "on"], self.command_timeout)?
                }
            },
            (other, None) => {
                return Err(ConvergeError::execution_failed(format!(
                    "no command for service action {}",
                    other
                )))
            }
        };
        ensure_success(&format!("{} {}", service.name, action), result)?;
        info!(service = %service.name, action = %action, "Service action completed");
        Ok(())
    }
}
