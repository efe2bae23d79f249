//! Session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable metadata for one interactive session.
///
/// Written at launch and kept after the container is gone so the session can
/// be resumed later. The conversation state itself lives next to this file
/// once exported (ephemeral sessions) or inside the container (persistent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Opaque session id handed to the supervised tool.
    pub id: String,
    /// Container identity this session ran in.
    pub container: String,
    /// Absolute workspace path the session was started from.
    pub workspace: String,
    /// Slot the container identity was derived from.
    pub slot: u32,
    /// Persistent sessions keep their container across detach/exit.
    pub persistent: bool,
    /// Creation time; resume auto-detection picks the latest of these.
    pub created_at: DateTime<Utc>,
    /// When conversation state was exported out of the container, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

/// How a launch obtained its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    /// A new container was created.
    Created,
    /// An existing running container was reused.
    Reused,
    /// An existing stopped container was started again.
    Restarted,
}

/// Mint a new opaque session id.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
