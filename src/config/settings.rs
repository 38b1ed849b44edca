//! Configuration settings for a convergence run.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConvergeError;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub rabbitmq: NodeConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Desired broker state for this node.
///
/// Immutable for the duration of a run and passed explicitly to every step.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Platform family ("debian", "rhel", "fedora", ...). Detected from
    /// `/etc/os-release` when unset.
    #[serde(default)]
    pub platform_family: Option<String>,
    /// Broker version used for artifact installs.
    #[serde(default = "default_version")]
    pub version: String,
    /// Broker pid file. Enables the `rabbitmqctl wait` readiness check.
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
    /// The init script's status/stop are unreliable; use manual commands.
    #[serde(default)]
    pub status_broken: bool,
    /// Install from the vendor apt repository instead of a downloaded .deb.
    #[serde(default = "default_true")]
    pub use_apt: bool,
    /// Install through yum instead of a downloaded .rpm.
    #[serde(default)]
    pub use_yum: bool,
    /// Skip the vendor apt repository and take the distribution's package.
    #[serde(default)]
    pub use_distro_version: bool,
    /// Manage the Erlang cookie shared by cluster members.
    #[serde(default)]
    pub cluster: bool,
    /// Desired Erlang cookie content.
    #[serde(default = "default_erlang_cookie")]
    pub erlang_cookie: String,
    /// Location of the Erlang cookie.
    #[serde(default = "default_erlang_cookie_path")]
    pub erlang_cookie_path: PathBuf,
    /// Account owning the cookie.
    #[serde(default = "default_broker_user")]
    pub broker_user: String,
    /// Group owning the cookie.
    #[serde(default = "default_broker_user")]
    pub broker_group: String,
    /// `NODENAME` in rabbitmq-env.conf.
    #[serde(default)]
    pub nodename: Option<String>,
    /// `NODE_IP_ADDRESS` in rabbitmq-env.conf.
    #[serde(default)]
    pub address: Option<String>,
    /// `NODE_PORT` in rabbitmq-env.conf.
    #[serde(default)]
    pub port: Option<u16>,
    /// `MNESIA_BASE` in rabbitmq-env.conf.
    #[serde(default)]
    pub mnesia_dir: Option<PathBuf>,
    /// `LOG_BASE` in rabbitmq-env.conf.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Additional environment entries appended to rabbitmq-env.conf.
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,
    /// Disk nodes listed in rabbitmq.config when clustering.
    #[serde(default)]
    pub cluster_disk_nodes: Vec<String>,
    /// Free disk space below which publishers are blocked.
    #[serde(default)]
    pub disk_free_limit: Option<u64>,
    /// Fraction of RAM at which the memory alarm fires.
    #[serde(default)]
    pub vm_memory_high_watermark: Option<f64>,
    /// Base URL for release artifacts.
    #[serde(default = "default_release_base_url")]
    pub release_base_url: String,
    /// Vendor apt repository.
    #[serde(default)]
    pub apt: AptRepositoryConfig,
}

/// Vendor apt repository registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AptRepositoryConfig {
    #[serde(default = "default_apt_uri")]
    pub uri: String,
    #[serde(default = "default_apt_distribution")]
    pub distribution: String,
    #[serde(default = "default_apt_components")]
    pub components: Vec<String>,
    #[serde(default = "default_apt_key")]
    pub key: String,
}

/// Paths configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory holding rabbitmq-env.conf and rabbitmq.config.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Where downloaded artifacts are cached.
    #[serde(default = "default_file_cache_path")]
    pub file_cache_path: PathBuf,
    /// Optional directory of `.tera` templates overriding the built-ins.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
    /// Init script controlling the broker.
    #[serde(default = "default_init_script")]
    pub init_script: PathBuf,
    /// apt sources directory.
    #[serde(default = "default_apt_sources_dir")]
    pub apt_sources_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Timeout for service and query commands, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    /// Timeout for package installs, in seconds.
    #[serde(default = "default_package_timeout")]
    pub package_timeout_seconds: u64,
    /// Timeout for downloads, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,
}

/// Audit journal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether the audit journal is written.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the journal file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "3.1.5".to_string()
}

fn default_erlang_cookie() -> String {
    "AnyAlphaNumericStringWillDo".to_string()
}

fn default_erlang_cookie_path() -> PathBuf {
    PathBuf::from("/var/lib/rabbitmq/.erlang.cookie")
}

fn default_broker_user() -> String {
    "rabbitmq".to_string()
}

fn default_release_base_url() -> String {
    "https://www.rabbitmq.com/releases".to_string()
}

fn default_apt_uri() -> String {
    "http://www.rabbitmq.com/debian/".to_string()
}

fn default_apt_distribution() -> String {
    "testing".to_string()
}

fn default_apt_components() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_apt_key() -> String {
    "http://www.rabbitmq.com/rabbitmq-signing-key-public.asc".to_string()
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/rabbitmq")
}

fn default_file_cache_path() -> PathBuf {
    PathBuf::from("/var/cache/rabbitmq-converge")
}

fn default_init_script() -> PathBuf {
    PathBuf::from("/etc/init.d/rabbitmq-server")
}

fn default_apt_sources_dir() -> PathBuf {
    PathBuf::from("/etc/apt/sources.list.d")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_command_timeout() -> u64 {
    120
}

fn default_package_timeout() -> u64 {
    600 // 10 minutes for package installations
}

fn default_download_timeout() -> u64 {
    300
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/rabbitmq-converge/audit.log")
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            platform_family: None,
            version: default_version(),
            pid_file: None,
            status_broken: false,
            use_apt: true,
            use_yum: false,
            use_distro_version: false,
            cluster: false,
            erlang_cookie: default_erlang_cookie(),
            erlang_cookie_path: default_erlang_cookie_path(),
            broker_user: default_broker_user(),
            broker_group: default_broker_user(),
            nodename: None,
            address: None,
            port: None,
            mnesia_dir: None,
            log_dir: None,
            extra_env: BTreeMap::new(),
            cluster_disk_nodes: Vec::new(),
            disk_free_limit: None,
            vm_memory_high_watermark: None,
            release_base_url: default_release_base_url(),
            apt: AptRepositoryConfig::default(),
        }
    }
}

impl Default for AptRepositoryConfig {
    fn default() -> Self {
        Self {
            uri: default_apt_uri(),
            distribution: default_apt_distribution(),
            components: default_apt_components(),
            key: default_apt_key(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            file_cache_path: default_file_cache_path(),
            templates_dir: None,
            init_script: default_init_script(),
            apt_sources_dir: default_apt_sources_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            command_timeout_seconds: default_command_timeout(),
            package_timeout_seconds: default_package_timeout(),
            download_timeout_seconds: default_download_timeout(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rabbitmq: NodeConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConvergeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConvergeError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConvergeError::Config { message } => ConvergeError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConvergeError> {
        let settings: Settings = toml::from_str(content).map_err(|e| ConvergeError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the ambient settings.
    ///
    /// Node-level invariants are checked by the converge preconditions so
    /// that they abort the run with the same error however settings were
    /// built.
    fn validate(&self) -> Result<(), ConvergeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConvergeError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ConvergeError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        if self.limits.command_timeout_seconds == 0 {
            return Err(ConvergeError::Config {
                message: "limits.command_timeout_seconds must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
