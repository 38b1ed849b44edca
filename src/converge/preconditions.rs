//! Checks run before the host is touched.

use tracing::debug;

use crate::config::NodeConfig;
use crate::error::{ConvergeError, ConvergeResult, ValidationErrorKind};
use crate::validation::{validate_absolute_path, validate_env_name, validate_version};

/// Validate the node configuration.
///
/// Pure: performs no host reads or writes, so a failure here aborts the
/// run before anything has changed.
pub fn check_preconditions(node: &NodeConfig) -> ConvergeResult<()> {
    if node.status_broken && node.pid_file.is_none() {
        return Err(ConvergeError::Config {
            message: "status_broken is set but no pid_file is configured; \
                      the manual status check needs a pid file"
                .to_string(),
        });
    }

    validate_version(&node.version)?;

    if let Some(pid_file) = &node.pid_file {
        validate_absolute_path("pid_file", pid_file)?;
    }

    for name in node.extra_env.keys() {
        validate_env_name(name)?;
    }

    if node.cluster {
        validate_absolute_path("erlang_cookie_path", &node.erlang_cookie_path)?;
        if node.erlang_cookie.trim().is_empty() {
            return Err(ConvergeError::Validation {
                kind: ValidationErrorKind::InvalidParameter {
                    param: "erlang_cookie".to_string(),
                    message: "must not be empty when cluster is enabled".to_string(),
                },
            });
        }
    }

    debug!(version = %node.version, cluster = node.cluster, "Preconditions satisfied");
    Ok(())
}
