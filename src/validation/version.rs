//! Broker version validation.
//!
//! The version is interpolated into download URLs, cache file names and
//! package manager arguments, so only dotted numeric versions are accepted.

use crate::error::{ConvergeError, ValidationErrorKind};

/// Validate a broker version such as `3.1.5`.
///
/// # Example
///
/// ```
/// use rabbitmq_converge::validation::validate_version;
///
/// assert!(validate_version("3.1.5").is_ok());
/// assert!(validate_version("3.1.5; rm -rf /").is_err());
/// ```
pub fn validate_version(version: &str) -> Result<(), ConvergeError> {
    let invalid = || ConvergeError::Validation {
        kind: ValidationErrorKind::InvalidVersion {
            version: version.to_string(),
        },
    };

    if version.is_empty() || version.len() > 32 {
        return Err(invalid());
    }

    let all_numeric_parts = version
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));

    if !all_numeric_parts {
        return Err(invalid());
    }

    Ok(())
}
