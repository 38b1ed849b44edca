//! System account resolution.
//!
//! File ownership is configured by account name and resolved to numeric
//! ids just before `chown`.

use nix::unistd::{Group, User};

use crate::error::{ConvergeError, ValidationErrorKind};

/// Resolve a user name to its UID.
pub fn resolve_user(name: &str) -> Result<u32, ConvergeError> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user.uid.as_raw()),
        Ok(None) => Err(ConvergeError::Validation {
            kind: ValidationErrorKind::UnknownAccount {
                name: name.to_string(),
            },
        }),
        Err(e) => Err(ConvergeError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: "owner".to_string(),
                message: format!("failed to look up user '{}': {}", name, e),
            },
        }),
    }
}

/// Resolve a group name to its GID.
pub fn resolve_group(name: &str) -> Result<u32, ConvergeError> {
    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group.gid.as_raw()),
        Ok(None) => Err(ConvergeError::Validation {
            kind: ValidationErrorKind::UnknownAccount {
                name: name.to_string(),
            },
        }),
        Err(e) => Err(ConvergeError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: "group".to_string(),
                message: format!("failed to look up group '{}': {}", name, e),
            },
        }),
    }
}
