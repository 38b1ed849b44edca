//! Template context built from the node configuration.

use serde_json::json;

use crate::config::{NodeConfig, PathsConfig};

/// AMQP port rabbit listens on when none is configured.
const DEFAULT_AMQP_PORT: u16 = 5672;

/// Build the context shared by every broker template.
pub fn node_context(node: &NodeConfig, paths: &PathsConfig) -> serde_json::Value {
    json!({
        "nodename": node.nodename,
        "address": node.address,
        "port": node.port,
        "listen_port": node.port.unwrap_or(DEFAULT_AMQP_PORT),
        "mnesia_dir": node.mnesia_dir.as_ref().map(|p| p.to_string_lossy()),
        "log_dir": node.log_dir.as_ref().map(|p| p.to_string_lossy()),
        // rabbit appends ".config" itself
        "config_file_base": paths.config_dir.join("rabbitmq").to_string_lossy(),
        "extra_env": node.extra_env,
        "cluster": node.cluster,
        "cluster_disk_nodes": node.cluster_disk_nodes,
        "disk_free_limit": node.disk_free_limit,
        "vm_memory_high_watermark": node.vm_memory_high_watermark,
        "erlang_cookie": node.erlang_cookie,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::run_shell;
    use crate::templates::TemplateEngine;
    use std::path::PathBuf;
    use std::time::Duration;

    fn render(template: &str, node: &NodeConfig) -> String {
        let engine = TemplateEngine::builtin().unwrap();
        engine
            .render(template, &node_context(node, &PathsConfig::default()))
            .unwrap()
    }

    #[test]
    fn test_env_file_defaults() {
        let rendered = render("rabbitmq-env.conf.tera", &NodeConfig::default());
        assert!(rendered.contains("CONFIG_FILE=\"/etc/rabbitmq/rabbitmq\"\n"));
        assert!(!rendered.contains("NODENAME"));
        assert!(!rendered.contains("NODE_PORT"));
    }

    #[test]
    fn test_env_file_values() {
        let mut node = NodeConfig {
            nodename: Some("rabbit@mq1".to_string()),
            address: Some("10.0.0.5".to_string()),
            port: Some(5673),
            mnesia_dir: Some(PathBuf::from("/var/lib/rabbitmq/mnesia")),
            ..NodeConfig::default()
        };
        node.extra_env
            .insert("SERVER_ERL_ARGS".to_string(), "+K true".to_string());

        let rendered = render("rabbitmq-env.conf.tera", &node);
        assert!(rendered.contains("NODENAME=\"rabbit@mq1\"\n"));
        assert!(rendered.contains("NODE_IP_ADDRESS=\"10.0.0.5\"\n"));
        assert!(rendered.contains("NODE_PORT=5673\n"));
        assert!(rendered.contains("MNESIA_BASE=\"/var/lib/rabbitmq/mnesia\"\n"));
        assert!(rendered.contains("SERVER_ERL_ARGS=\"+K true\"\n"));
    }

    #[test]
    fn test_env_file_survives_shell_sourcing() {
        let mut node = NodeConfig {
            log_dir: Some(PathBuf::from("/var/log/rabbit mq")),
            ..NodeConfig::default()
        };
        node.extra_env
            .insert("SERVER_ERL_ARGS".to_string(), "+K true +A 30".to_string());
        node.extra_env.insert(
            "RABBITMQ_CTL_ERL_ARGS".to_string(),
            r#"-s "quoted" $HOME `id` \x"#.to_string(),
        );

        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("rabbitmq-env.conf");
        std::fs::write(&env_file, render("rabbitmq-env.conf.tera", &node)).unwrap();

        let script = format!(
            "set -e; . '{}'; printf '%s|%s|%s' \"$SERVER_ERL_ARGS\" \"$LOG_BASE\" \"$RABBITMQ_CTL_ERL_ARGS\"",
            env_file.display()
        );
        let result = run_shell(&script, Duration::from_secs(5)).unwrap();

        assert!(result.success, "stderr: {}", result.stderr);
        assert_eq!(
            result.stdout,
            r#"+K true +A 30|/var/log/rabbit mq|-s "quoted" $HOME `id` \x"#
        );
    }

    #[test]
    fn test_broker_config_standalone() {
        let rendered = render("rabbitmq.config.tera", &NodeConfig::default());
        assert!(rendered.contains("{tcp_listeners, [5672]}"));
        assert!(!rendered.contains("cluster_nodes"));
        assert!(rendered.trim_end().ends_with("]."));
    }

    #[test]
    fn test_broker_config_cluster_nodes() {
        let node = NodeConfig {
            cluster: true,
            cluster_disk_nodes: vec!["rabbit@mq1".to_string(), "rabbit@mq2".to_string()],
            disk_free_limit: Some(50_000_000),
            ..NodeConfig::default()
        };
        let rendered = render("rabbitmq.config.tera", &node);
        assert!(rendered.contains("{cluster_nodes, {['rabbit@mq1', 'rabbit@mq2'], disc}},"));
        assert!(rendered.contains("{disk_free_limit, 50000000},"));
    }
}
