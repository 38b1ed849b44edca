//! Service definition traits.
//!
//! Defines the interface for a managed service.

/// A configuration file rendered from a template for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedConfig {
    /// Template name (e.g., "rabbitmq-env.conf.tera").
    pub template: &'static str,
    /// File name inside the service's configuration directory.
    pub file_name: &'static str,
}

/// Defines a manageable service.
///
/// Provides the metadata the converge steps need: which package provides
/// the service, which unit or init script controls it, and which
/// configuration files are rendered for it.
///
/// # Example
///
/// ```ignore
/// pub struct RabbitmqService;
///
/// impl ServiceDefinition for RabbitmqService {
///     fn name(&self) -> &'static str { "rabbitmq-server" }
///     fn display_name(&self) -> &'static str { "RabbitMQ" }
///     fn package_name(&self) -> &'static str { "rabbitmq-server" }
///     fn managed_configs(&self) -> Vec<ManagedConfig> { vec![] }
/// }
/// ```
pub trait ServiceDefinition: Send + Sync {
    /// Service identifier, also the init script and unit name.
    fn name(&self) -> &'static str;

    /// Human-readable display name, used in status messages.
    fn display_name(&self) -> &'static str;

    /// Package providing the service.
    fn package_name(&self) -> &'static str;

    /// Packages the service commands depend on, installed before the
    /// service package on Debian-like hosts.
    fn helper_packages(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Configuration files rendered for this service.
    fn managed_configs(&self) -> Vec<ManagedConfig>;
}
