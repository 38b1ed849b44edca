//! Audit logger writing entries to a file.
//!
//! Writes one JSON object per line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::ConvergeError;

use super::entry::AuditEntry;

/// Append-only JSON-lines journal.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Open (or create) the journal at `path` in append mode.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn new(path: &Path) -> Result<Self, ConvergeError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit logger initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Append an entry and sync it to disk.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), ConvergeError> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.file.lock().map_err(|e| {
            ConvergeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to acquire audit log lock: {}", e),
            ))
        })?;

        writeln!(file, "{}", json)?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        Ok(())
    }

    /// Get the path to the audit log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn test_logger_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("audit.log");
        let logger = AuditLogger::new(&path).unwrap();

        logger
            .log(&AuditEntry::applied(
                Uuid::nil(),
                "packages",
                serde_json::json!({"action": "install_package"}),
            ))
            .unwrap();
        logger
            .log(&AuditEntry::failed(
                Uuid::nil(),
                "configuration",
                "TEMPLATE_ERROR",
                "bad template".to_string(),
            ))
            .unwrap();

        let content = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("timestamp").is_some());
        }
    }

    #[test]
    fn test_logger_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");

        for _ in 0..2 {
            let logger = AuditLogger::new(&path).unwrap();
            logger
                .log(&AuditEntry::applied(Uuid::nil(), "enable", serde_json::json!({})))
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
