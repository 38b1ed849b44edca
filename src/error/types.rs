//! Error types for the convergence run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for a convergence run.
#[derive(Error, Debug)]
pub enum ConvergeError {
    /// Fatal configuration errors, raised before any host mutation.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// Host command execution errors.
    #[error("Command error: {kind}")]
    Command { kind: CommandErrorKind },

    /// Template-related errors.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Artifact or signing key download errors.
    #[error("Download of '{url}' failed: {message}")]
    Download { url: String, message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConvergeError {
    /// Shorthand for a failed host command.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        ConvergeError::Command {
            kind: CommandErrorKind::ExecutionFailed {
                message: message.into(),
            },
        }
    }

    /// Stable code used in the audit journal.
    pub fn code(&self) -> &'static str {
        match self {
            ConvergeError::Config { .. } => "CONFIG_ERROR",
            ConvergeError::Validation { .. } => "VALIDATION_ERROR",
            ConvergeError::Command { kind } => match kind {
                CommandErrorKind::Timeout { .. } => "COMMAND_TIMEOUT",
                CommandErrorKind::ExecutionFailed { .. } => "COMMAND_FAILED",
            },
            ConvergeError::Template { .. } => "TEMPLATE_ERROR",
            ConvergeError::Download { .. } => "DOWNLOAD_ERROR",
            ConvergeError::Io(_) => "IO_ERROR",
            ConvergeError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Validation error kinds.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("Path must be absolute: {path}")]
    RelativePath { path: PathBuf },

    #[error("Invalid package name: {package}")]
    InvalidPackageName { package: String },

    #[error("Invalid broker version: {version}")]
    InvalidVersion { version: String },

    #[error("Unknown system account: {name}")]
    UnknownAccount { name: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Command error kinds.
#[derive(Error, Debug)]
pub enum CommandErrorKind {
    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

/// Result type alias for convergence operations.
pub type ConvergeResult<T> = Result<T, ConvergeError>;
