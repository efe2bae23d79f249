//! Durable session store.
//!
//! One directory per session id under the sessions dir:
//!
//! ```text
//! <sessions>/<id>/metadata.json   session metadata
//! <sessions>/<id>/state/          exported conversation state (ephemeral)
//! ```
//!
//! Listing is a read-through directory scan on every call; nothing is cached
//! across invocations, so concurrent processes always see current state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::{Error, Result};

use super::models::SessionMetadata;

const METADATA_FILE: &str = "metadata.json";
const STATE_DIR: &str = "state";

/// File-backed store for session metadata and exported state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding one session's files.
    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Directory holding one session's exported conversation state.
    pub fn state_dir(&self, id: &str) -> PathBuf {
        self.session_dir(id).join(STATE_DIR)
    }

    /// Persist session metadata, creating the session directory as needed.
    pub fn save(&self, meta: &SessionMetadata) -> Result<()> {
        let dir = self.session_dir(&meta.id);
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| Error::Runtime {
                command: "save-session".to_string(),
                message: e.to_string(),
            })?;
        fs::write(dir.join(METADATA_FILE), json)?;
        Ok(())
    }

    /// Load one session's metadata.
    pub fn load(&self, id: &str) -> Result<SessionMetadata> {
        let path = self.session_dir(id).join(METADATA_FILE);
        let data = fs::read_to_string(&path)
            .map_err(|_| Error::not_found(format!("session '{id}' not found")))?;
        serde_json::from_str(&data).map_err(|e| Error::Runtime {
            command: "load-session".to_string(),
            message: format!("corrupt metadata for session '{id}': {e}"),
        })
    }

    /// All stored sessions. Directories without parseable metadata are
    /// skipped.
    pub fn list(&self) -> Result<Vec<SessionMetadata>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load(&id) {
                Ok(meta) => sessions.push(meta),
                Err(err) => {
                    tracing::debug!("skipping session directory {id:?}: {err}");
                }
            }
        }

        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    /// Sessions created from a given workspace, oldest first.
    pub fn list_for_workspace(&self, workspace: &Path) -> Result<Vec<SessionMetadata>> {
        let workspace = workspace.display().to_string();
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.workspace == workspace)
            .collect())
    }

    /// The most recently created session for a workspace, if any.
    ///
    /// "Most recent" is by creation timestamp; see DESIGN.md.
    pub fn latest_for_workspace(&self, workspace: &Path) -> Result<Option<SessionMetadata>> {
        Ok(self.list_for_workspace(workspace)?.pop())
    }

    /// Remove a session and everything stored for it.
    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.session_dir(id);
        if !dir.exists() {
            return Err(Error::not_found(format!("session '{id}' not found")));
        }
        fs::remove_dir_all(&dir)
            .with_context(|| format!("removing session directory {}", dir.display()))
            .map_err(|e| Error::Runtime {
                command: "delete-session".to_string(),
                message: e.to_string(),
            })
    }
}
