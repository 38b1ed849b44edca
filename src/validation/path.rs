//! Path validation.

use std::path::{Component, Path};

use crate::error::{ConvergeError, ValidationErrorKind};

/// Validate that a configured path is absolute and free of `..` components.
///
/// `param` names the configuration key in the error message.
pub fn validate_absolute_path(param: &str, path: &Path) -> Result<(), ConvergeError> {
    if !path.is_absolute() {
        return Err(ConvergeError::Validation {
            kind: ValidationErrorKind::RelativePath {
                path: path.to_path_buf(),
            },
        });
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConvergeError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: param.to_string(),
                message: format!("path '{}' contains '..'", path.display()),
            },
        });
    }

    Ok(())
}
