//! Audit entry types.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A single audit journal entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Identifier shared by all entries of one run.
    pub run_id: Uuid,
    /// Converge step that produced the entry.
    pub step: String,
    /// The mutation applied, or null for a run failure.
    pub mutation: serde_json::Value,
    /// Outcome.
    pub result: AuditResult,
}

impl AuditEntry {
    /// Entry for an applied mutation.
    pub fn applied(run_id: Uuid, step: &str, mutation: serde_json::Value) -> Self {
        Self {
            timestamp: now(),
            run_id,
            step: step.to_string(),
            mutation,
            result: AuditResult::Success,
        }
    }

    /// Entry for the error that aborted a run.
    pub fn failed(run_id: Uuid, step: &str, error_code: &str, error_message: String) -> Self {
        Self {
            timestamp: now(),
            run_id,
            step: step.to_string(),
            mutation: serde_json::Value::Null,
            result: AuditResult::Failure {
                error_code: error_code.to_string(),
                error_message,
            },
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Result of a journaled action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failure")]
    Failure {
        error_code: String,
        error_message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_serialization() {
        let entry = AuditEntry::applied(
            Uuid::nil(),
            "configuration",
            serde_json::json!({"action": "service", "action_name": "restart"}),
        );

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("\"step\":\"configuration\""));
        assert!(json.contains("\"run_id\":\"00000000-0000-0000-0000-000000000000\""));
    }

    #[test]
    fn test_failed_serialization() {
        let entry = AuditEntry::failed(
            Uuid::nil(),
            "packages",
            "COMMAND_FAILED",
            "install of rabbitmq-server failed".to_string(),
        );

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"status\":\"failure\""));
        assert!(json.contains("\"error_code\":\"COMMAND_FAILED\""));
        assert!(json.contains("\"mutation\":null"));
        assert!(entry.timestamp.ends_with('Z'));
    }
}
