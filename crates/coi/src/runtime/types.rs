//! Container runtime data types.
//!
//! Lean views over the JSON the runtime CLI prints. Fields the engine does
//! not consume are left out; unknown fields are ignored on parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One container instance as reported by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Instance name.
    pub name: String,
    /// Status string as reported by the runtime ("Running", "Stopped", ...).
    #[serde(default)]
    pub status: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Whether the runtime considers this instance running.
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }

    /// Whether the runtime considers this instance stopped.
    pub fn is_stopped(&self) -> bool {
        self.status.eq_ignore_ascii_case("stopped")
    }
}

/// One snapshot of a container's writable layer.
///
/// Snapshots never include externally mounted directories; the runtime
/// versions only the instance's own storage volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    /// Snapshot name, unique within its container.
    pub name: String,
    /// Creation timestamp; snapshots are totally ordered by this.
    pub created_at: DateTime<Utc>,
    /// Whether process memory was captured in addition to disk state.
    #[serde(default)]
    pub stateful: bool,
}

/// Output of a captured exec inside a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command inside the container exited 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_status_checks_ignore_case() {
        let instance = Instance {
            name: "coi-abc-1".to_string(),
            status: "RUNNING".to_string(),
            created_at: None,
        };
        assert!(instance.is_running());
        assert!(!instance.is_stopped());
    }

    #[test]
    fn snapshot_parses_runtime_json() {
        let raw = r#"{
            "name": "checkpoint-1",
            "created_at": "2026-03-01T10:00:00Z",
            "stateful": true,
            "expires_at": "0001-01-01T00:00:00Z"
        }"#;
        let snapshot: InstanceSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.name, "checkpoint-1");
        assert!(snapshot.stateful);
    }
}
