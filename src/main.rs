//! rabbitmq-converge - converge a host toward a running RabbitMQ broker.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rabbitmq_converge::audit::AuditLogger;
use rabbitmq_converge::config::Settings;
use rabbitmq_converge::converge::Converger;
use rabbitmq_converge::error::ConvergeError;
use rabbitmq_converge::host::{Host, InitSystem, SystemHost};
use rabbitmq_converge::packages::PlatformFamily;
use rabbitmq_converge::services::probe_pid_file;
use rabbitmq_converge::templates::TemplateEngine;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

const DEFAULT_CONFIG_PATH: &str = "/etc/rabbitmq-converge/node.toml";

/// LSB exit status for "program is not running".
const EXIT_NOT_RUNNING: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Converge,
    Status,
    Plan,
}

fn main() -> ExitCode {
    // Parse command line arguments (simple std::env approach)
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let command = match get_command(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Run '{} --help' for usage.", NAME);
            return ExitCode::FAILURE;
        }
    };

    let config_path = get_config_path(&args);

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting {} v{}", NAME, VERSION);
    info!("Configuration loaded from: {}", config_path);

    let platform = PlatformFamily::resolve(settings.rabbitmq.platform_family.as_deref());
    info!(platform = %platform, "Platform family resolved");

    let templates = match &settings.paths.templates_dir {
        Some(dir) => TemplateEngine::with_overrides(dir),
        None => TemplateEngine::builtin(),
    };
    let templates = match templates {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "Failed to initialize templates");
            return ExitCode::FAILURE;
        }
    };

    let init = InitSystem::detect(platform.package_format());
    let mut host = SystemHost::new(&settings.limits, init);
    info!(init_system = ?host.init_system(), "Host initialized");

    let audit_logger = open_audit_logger(&settings);
    let mut converger = Converger::new(settings, platform, templates);
    if let Some(logger) = audit_logger {
        converger = converger.with_audit(logger);
    }

    let result = match command {
        Command::Converge => run_converge(&converger, &mut host),
        Command::Status => run_status(&converger, &host),
        Command::Plan => run_plan(&converger),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, code = e.code(), "{} failed", NAME);
            ExitCode::FAILURE
        }
    }
}

fn run_converge(converger: &Converger, host: &mut SystemHost) -> Result<ExitCode, ConvergeError> {
    let report = converger.run(host)?;

    for warning in &report.warnings {
        warn!("{}", warning);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(ExitCode::SUCCESS)
}

fn run_status(converger: &Converger, host: &SystemHost) -> Result<ExitCode, ConvergeError> {
    let descriptor = converger.descriptor()?;

    let running = match &descriptor.pid_file {
        Some(pid_file) => {
            let status = probe_pid_file(pid_file);
            println!("{}", status);
            status.is_running()
        }
        None => {
            let running = host.service_running(&descriptor)?;
            println!(
                "{} {}",
                descriptor.name,
                if running { "running" } else { "not running" }
            );
            running
        }
    };

    Ok(if running {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NOT_RUNNING)
    })
}

fn run_plan(converger: &Converger) -> Result<ExitCode, ConvergeError> {
    let plan = converger.plan()?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(ExitCode::SUCCESS)
}

/// Open the audit journal if enabled. A journal that cannot be opened
/// disables auditing rather than failing the run.
fn open_audit_logger(settings: &Settings) -> Option<Arc<AuditLogger>> {
    if !settings.audit.enabled {
        info!("Audit logging disabled");
        return None;
    }

    match AuditLogger::new(&settings.audit.log_path) {
        Ok(logger) => {
            info!(path = %logger.path().display(), "Audit logging enabled");
            Some(Arc::new(logger))
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %settings.audit.log_path.display(),
                "Failed to create audit logger, audit logging disabled"
            );
            None
        }
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Install, configure and converge a RabbitMQ broker on this host.

USAGE:
    {} [OPTIONS] [COMMAND]

COMMANDS:
    converge               Converge the host (default)
    status                 Report whether the broker is running
    plan                   Print the service commands and install strategy

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: {}]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME, DEFAULT_CONFIG_PATH
    );
}

/// Get the subcommand: the first argument that is neither an option nor an
/// option's value.
fn get_command(args: &[String]) -> Result<Command, String> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            iter.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return match arg.as_str() {
            "converge" => Ok(Command::Converge),
            "status" => Ok(Command::Status),
            "plan" => Ok(Command::Plan),
            other => Err(format!("Unknown command '{}'", other)),
        };
    }
    Ok(Command::Converge)
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// Initialize logging based on settings.
///
/// Logs go to stderr so `plan` and `converge` output on stdout stays
/// machine-readable.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
