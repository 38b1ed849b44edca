//! Environment variable name validation.

use crate::error::{ConvergeError, ValidationErrorKind};

/// Validate a variable name written into the shell-sourced env file.
///
/// Names must match `[A-Z_][A-Z0-9_]*`.
pub fn validate_env_name(name: &str) -> Result<(), ConvergeError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');

    if !valid {
        return Err(ConvergeError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: "extra_env".to_string(),
                message: format!("'{}' is not a valid variable name", name),
            },
        });
    }

    Ok(())
}
