//! Package name validation.

use crate::error::{ConvergeError, ValidationErrorKind};

/// Maximum length of a package name.
const MAX_PACKAGE_NAME_LENGTH: usize = 128;

/// Validate a package name against the common Debian/RPM naming rules.
///
/// Names must start with an alphanumeric character and contain only
/// lowercase letters, digits, `+`, `-`, `.` and `_`.
pub fn validate_package_name(name: &str) -> Result<(), ConvergeError> {
    let invalid = || ConvergeError::Validation {
        kind: ValidationErrorKind::InvalidPackageName {
            package: name.to_string(),
        },
    };

    if name.len() < 2 || name.len() > MAX_PACKAGE_NAME_LENGTH {
        return Err(invalid());
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return Err(invalid()),
    }

    if !chars.all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | '_')
    }) {
        return Err(invalid());
    }

    Ok(())
}
