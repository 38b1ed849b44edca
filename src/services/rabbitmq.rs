//! RabbitMQ service definition.

use super::traits::{ManagedConfig, ServiceDefinition};

/// Template for the cookie shared by cluster members.
pub const ERLANG_COOKIE_TEMPLATE: &str = "erlang.cookie.tera";

/// RabbitMQ message broker.
pub struct RabbitmqService;

impl ServiceDefinition for RabbitmqService {
    fn name(&self) -> &'static str {
        "rabbitmq-server"
    }

    fn display_name(&self) -> &'static str {
        "RabbitMQ"
    }

    fn package_name(&self) -> &'static str {
        "rabbitmq-server"
    }

    fn helper_packages(&self) -> Vec<&'static str> {
        // setsid, used by the start command
        vec!["util-linux"]
    }

    fn managed_configs(&self) -> Vec<ManagedConfig> {
        vec![
            ManagedConfig {
                template: "rabbitmq-env.conf.tera",
                file_name: "rabbitmq-env.conf",
            },
            ManagedConfig {
                template: "rabbitmq.config.tera",
                file_name: "rabbitmq.config",
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rabbitmq_service() {
        let service = RabbitmqService;
        assert_eq!(service.name(), "rabbitmq-server");
        assert_eq!(service.display_name(), "RabbitMQ");
        assert_eq!(service.package_name(), "rabbitmq-server");
        assert_eq!(service.helper_packages(), vec!["util-linux"]);
    }

    #[test]
    fn test_rabbitmq_managed_configs() {
        let files: Vec<_> = RabbitmqService
            .managed_configs()
            .iter()
            .map(|c| c.file_name)
            .collect();
        assert_eq!(files, vec!["rabbitmq-env.conf", "rabbitmq.config"]);
    }
}
