//! Integration tests for full convergence runs.
//!
//! Runs are driven against `MemoryHost`, and against a host that writes
//! real files through `SystemHost` while simulating packages and services.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::unistd::{getgid, getuid, Group, User};
use tempfile::TempDir;

use rabbitmq_converge::audit::AuditLogger;
use rabbitmq_converge::config::{LimitsConfig, Settings};
use rabbitmq_converge::converge::{Converger, Mutation, Step};
use rabbitmq_converge::error::ConvergeResult;
use rabbitmq_converge::host::{
    Artifact, FileSpec, Host, HostEvent, InitSystem, MemoryHost, PackageFormat, SystemHost,
    WriteOutcome,
};
use rabbitmq_converge::packages::PlatformFamily;
use rabbitmq_converge::services::{ServiceAction, ServiceDescriptor};
use rabbitmq_converge::templates::TemplateEngine;

fn converger(settings: Settings, platform: PlatformFamily) -> Converger {
    Converger::new(settings, platform, TemplateEngine::builtin().unwrap())
}

fn settings_from(toml: &str) -> Settings {
    Settings::from_toml(toml).expect("valid settings")
}

#[test]
fn test_debian_apt_fresh_host() {
    let settings = settings_from(
        r#"
[rabbitmq]
platform_family = "ubuntu"
nodename = "rabbit@mq1"
"#,
    );
    let converger = converger(settings, PlatformFamily::DebianLike);
    let mut host = MemoryHost::new();

    let report = converger.run(&mut host).unwrap();

    let installs: Vec<&str> = host
        .events
        .iter()
        .filter_map(|e| match e {
            HostEvent::InstallPackage { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(installs, vec!["util-linux", "rabbitmq-server"]);
    assert_eq!(host.packages["rabbitmq-server"], "latest");

    let list = &host.files[&PathBuf::from("/etc/apt/sources.list.d/rabbitmq.list")];
    assert_eq!(list.content, "deb http://www.rabbitmq.com/debian/ testing main\n");

    let env = &host.files[&PathBuf::from("/etc/rabbitmq/rabbitmq-env.conf")];
    assert!(env.content.contains("NODENAME=\"rabbit@mq1\"\n"));
    assert_eq!((env.owner.as_str(), env.mode), ("root", 0o644));

    assert_eq!(
        host.service_actions(),
        vec![ServiceAction::Restart, ServiceAction::Enable]
    );
    assert!(host.running && host.enabled);
    assert_eq!(report.restarts(), 1);
    assert!(report.warnings.is_empty());

    // cluster is off by default
    assert!(!host
        .reads()
        .contains(&PathBuf::from("/var/lib/rabbitmq/.erlang.cookie")));
}

#[test]
fn test_rhel_artifact_fresh_host() {
    let settings = settings_from(
        r#"
[rabbitmq]
version = "3.1.5"

[paths]
file_cache_path = "/var/chef/cache"
"#,
    );
    let converger = converger(settings, PlatformFamily::RpmLike);
    let mut host = MemoryHost::new();

    converger.run(&mut host).unwrap();

    let rpm = PathBuf::from("/var/chef/cache/rabbitmq-server-3.1.5-1.noarch.rpm");
    assert_eq!(
        host.events[0],
        HostEvent::Download {
            url: "https://www.rabbitmq.com/releases/rabbitmq-server/v3.1.5/rabbitmq-server-3.1.5-1.noarch.rpm"
                .to_string(),
            dest: rpm.clone(),
        }
    );
    assert_eq!(host.events[1], HostEvent::InstallArtifact { path: rpm });
    assert_eq!(host.packages["rabbitmq-server"], "3.1.5-1");
    assert!(!host
        .events
        .iter()
        .any(|e| matches!(e, HostEvent::InstallPackage { .. })));

    // pinned version already installed, artifact already cached
    host.clear_events();
    let report = converger.run(&mut host).unwrap();
    assert!(!report.changed());
    assert!(host.events.is_empty());
}

#[test]
fn test_status_broken_without_pid_file_aborts() {
    let settings = settings_from(
        r#"
[rabbitmq]
status_broken = true
cluster = true
"#,
    );
    let converger = converger(settings, PlatformFamily::DebianLike);
    let mut host = MemoryHost::new();

    let err = converger.run(&mut host).unwrap_err();

    assert_eq!(err.code(), "CONFIG_ERROR");
    assert!(host.events.is_empty());
    assert!(host.reads().is_empty());
}

#[test]
fn test_status_broken_descriptor() {
    let settings = settings_from(
        r#"
[rabbitmq]
status_broken = true
pid_file = "/var/run/rabbitmq/pid"
"#,
    );
    let plan = converger(settings, PlatformFamily::DebianLike).plan().unwrap();

    assert_eq!(plan.service.stop, "rabbitmqctl stop");
    assert!(plan.service.status.contains("kill -0"));
    assert!(plan
        .service
        .start
        .ends_with("timeout 60 rabbitmqctl wait '/var/run/rabbitmq/pid'"));
}

#[test]
fn test_cookie_rotation_on_running_cluster() {
    let settings = settings_from(
        r#"
[rabbitmq]
use_yum = true
cluster = true
erlang_cookie = "NEWCOOKIE"
"#,
    );
    let rotate = converger(settings, PlatformFamily::RpmLike);

    // converge once with the old cookie, then rotate
    let mut host = MemoryHost::new()
        .running()
        .with_package("rabbitmq-server", "3.1.5-1");
    let mut old = rotate.settings().clone();
    old.rabbitmq.erlang_cookie = "OLDCOOKIE".to_string();
    converger(old, PlatformFamily::RpmLike).run(&mut host).unwrap();
    host.clear_events();

    let report = rotate.run(&mut host).unwrap();

    assert_eq!(
        host.events,
        vec![
            HostEvent::Service {
                action: ServiceAction::Stop
            },
            HostEvent::WriteFile {
                path: PathBuf::from("/var/lib/rabbitmq/.erlang.cookie"),
                owner: "rabbitmq".to_string(),
                group: "rabbitmq".to_string(),
                mode: 0o400,
                outcome: WriteOutcome::ContentWritten,
            },
            HostEvent::Service {
                action: ServiceAction::Start
            },
        ]
    );
    assert!(report
        .entries
        .iter()
        .all(|e| e.step == Step::ClusterSecret));
}

#[test]
fn test_failure_stops_later_steps() {
    let converger = converger(Settings::default(), PlatformFamily::RpmLike);
    let mut host = MemoryHost::new().with_failing_package("rabbitmq-server");

    let err = converger.run(&mut host).unwrap_err();

    assert_eq!(err.code(), "COMMAND_FAILED");
    // the download happened; nothing after the failed install did
    assert_eq!(host.events.len(), 1);
    assert!(host.service_actions().is_empty());
}

#[test]
fn test_audit_journal_records_run() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("audit.log");
    let logger = Arc::new(AuditLogger::new(&log_path).unwrap());

    let converger =
        converger(Settings::default(), PlatformFamily::DebianLike).with_audit(logger);
    let mut host = MemoryHost::new();
    let report = converger.run(&mut host).unwrap();

    let lines: Vec<serde_json::Value> = fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), report.entries.len());
    let run_id = report.run_id.to_string();
    assert!(lines.iter().all(|l| l["run_id"] == run_id.as_str()));
    assert!(lines
        .iter()
        .any(|l| l["step"] == "configuration" && l["mutation"]["action"] == "restart"));
}

/// Files go through `SystemHost`; everything else is simulated.
struct FilesystemHost {
    files: SystemHost,
    rest: MemoryHost,
}

impl Host for FilesystemHost {
    fn read_file(&self, path: &Path) -> ConvergeResult<Option<String>> {
        self.files.read_file(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.file_exists(path)
    }

    fn write_file(&mut self, spec: &FileSpec<'_>) -> ConvergeResult<WriteOutcome> {
        self.files.write_file(spec)
    }

    fn download(&mut self, url: &str, dest: &Path) -> ConvergeResult<()> {
        self.rest.download(url, dest)
    }

    fn installed_version(
        &self,
        format: PackageFormat,
        name: &str,
    ) -> ConvergeResult<Option<String>> {
        self.rest.installed_version(format, name)
    }

    fn install_package(&mut self, format: PackageFormat, name: &str) -> ConvergeResult<()> {
        self.rest.install_package(format, name)
    }

    fn install_artifact(&mut self, artifact: &Artifact) -> ConvergeResult<()> {
        self.rest.install_artifact(artifact)
    }

    fn import_signing_key(&mut self, key_file: &Path) -> ConvergeResult<()> {
        self.rest.import_signing_key(key_file)
    }

    fn refresh_package_index(&mut self, format: PackageFormat) -> ConvergeResult<()> {
        self.rest.refresh_package_index(format)
    }

    fn service_running(&self, service: &ServiceDescriptor) -> ConvergeResult<bool> {
        self.rest.service_running(service)
    }

    fn service_enabled(&self, service: &ServiceDescriptor) -> ConvergeResult<bool> {
        self.rest.service_enabled(service)
    }

    fn service_action(
        &mut self,
        service: &ServiceDescriptor,
        action: ServiceAction,
    ) -> ConvergeResult<()> {
        self.rest.service_action(service, action)
    }
}

#[test]
fn test_real_files_converge_idempotently() {
    let dir = TempDir::new().unwrap();
    let user = User::from_uid(getuid()).unwrap().unwrap().name;
    let group = Group::from_gid(getgid()).unwrap().unwrap().name;
    let cookie_path = dir.path().join("lib").join(".erlang.cookie");

    let mut settings = Settings::default();
    settings.rabbitmq.cluster = true;
    settings.rabbitmq.erlang_cookie = "FILESYSTEMCOOKIE".to_string();
    settings.rabbitmq.erlang_cookie_path = cookie_path.clone();
    settings.rabbitmq.broker_user = user;
    settings.rabbitmq.broker_group = group;
    settings.paths.config_dir = dir.path().join("etc");
    settings.audit.enabled = false;

    // config files are chowned to root
    if !getuid().is_root() {
        return;
    }

    let converger = converger(settings, PlatformFamily::Unknown("test".to_string()));
    let mut host = FilesystemHost {
        files: SystemHost::new(&LimitsConfig::default(), InitSystem::UpdateRcD),
        rest: MemoryHost::new(),
    };

    let report = converger.run(&mut host).unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.restarts(), 1);

    assert_eq!(fs::read_to_string(&cookie_path).unwrap(), "FILESYSTEMCOOKIE");
    let meta = fs::metadata(&cookie_path).unwrap();
    assert_eq!(meta.mode() & 0o7777, 0o400);
    assert_eq!(meta.uid(), getuid().as_raw());

    let config = dir.path().join("etc").join("rabbitmq.config");
    assert!(fs::read_to_string(&config).unwrap().contains("tcp_listeners"));

    // loosen a config file's mode: corrected without a restart
    fs::set_permissions(&config, fs::Permissions::from_mode(0o666)).unwrap();
    host.rest.clear_events();
    let report = converger.run(&mut host).unwrap();

    assert_eq!(report.restarts(), 0);
    assert!(matches!(
        report.mutations().collect::<Vec<_>>().as_slice(),
        [Mutation::WriteFile {
            outcome: WriteOutcome::MetadataUpdated,
            ..
        }]
    ));
    assert_eq!(fs::metadata(&config).unwrap().mode() & 0o7777, 0o644);
    assert!(host.rest.events.is_empty());

    let report = converger.run(&mut host).unwrap();
    assert!(!report.changed());
}
