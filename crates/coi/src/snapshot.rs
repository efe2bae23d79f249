//! Snapshot management.
//!
//! Snapshots version a container's writable layer only; mounted directories
//! (the workspace) are never captured. Within a container they form a strict
//! total order by creation time, and restore is only legal at the tail of
//! that order: rolling back past committed checkpoints requires deleting
//! them first. The ordering precondition is enforced here, not left to the
//! storage backend, so the error can name the snapshots in the way.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::runtime::{ContainerRuntime, InstanceSnapshot};

/// Prefix of auto-generated snapshot names.
const AUTO_NAME_PREFIX: &str = "snap";

/// Generate a snapshot name from a timestamp, e.g. `snap-20260305-142311`.
pub fn auto_name(at: DateTime<Utc>) -> String {
    format!("{AUTO_NAME_PREFIX}-{}", at.format("%Y%m%d-%H%M%S"))
}

/// Snapshots created strictly after `target`, in creation order.
///
/// `snapshots` must be in creation order, as [`ContainerRuntime::snapshot_list`]
/// returns them.
pub fn snapshots_after<'a>(
    snapshots: &'a [InstanceSnapshot],
    target: &InstanceSnapshot,
) -> Vec<&'a InstanceSnapshot> {
    snapshots
        .iter()
        .filter(|s| s.created_at > target.created_at)
        .collect()
}

/// Snapshot operations scoped to an already-resolved container identity.
pub struct SnapshotManager<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Create a snapshot. An empty or missing name gets an auto-generated
    /// one; duplicate names are rejected without touching the container.
    pub async fn create(
        &self,
        container: &str,
        name: Option<&str>,
        stateful: bool,
    ) -> Result<String> {
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => auto_name(Utc::now()),
        };

        let existing = self.runtime.snapshot_list(container).await?;
        if existing.iter().any(|s| s.name == name) {
            return Err(Error::AlreadyExists(format!(
                "snapshot '{name}' already exists for container '{container}'"
            )));
        }

        self.runtime
            .snapshot_create(container, &name, stateful)
            .await?;
        Ok(name)
    }

    /// All snapshots of a container, oldest first.
    pub async fn list(&self, container: &str) -> Result<Vec<InstanceSnapshot>> {
        self.runtime.snapshot_list(container).await
    }

    /// Look up one snapshot.
    pub async fn info(&self, container: &str, name: &str) -> Result<InstanceSnapshot> {
        self.runtime
            .snapshot_list(container)
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "snapshot '{name}' not found for container '{container}'"
                ))
            })
    }

    /// Restore the container's writable layer from a snapshot.
    ///
    /// Preconditions, checked in order: the snapshot exists, the container
    /// is stopped, and no later snapshot exists. The container's own
    /// started/stopped state is not changed by a successful restore.
    pub async fn restore(&self, container: &str, name: &str) -> Result<()> {
        let snapshots = self.runtime.snapshot_list(container).await?;
        let target = snapshots.iter().find(|s| s.name == name).ok_or_else(|| {
            Error::not_found(format!(
                "snapshot '{name}' not found for container '{container}'"
            ))
        })?;

        if self.runtime.is_running(container).await? {
            return Err(Error::invalid_state(format!(
                "container '{container}' must be stopped before restore (use 'coi container stop {container}')"
            )));
        }

        let later = snapshots_after(&snapshots, target);
        if !later.is_empty() {
            let names: Vec<&str> = later.iter().map(|s| s.name.as_str()).collect();
            return Err(Error::invalid_state(format!(
                "cannot restore '{name}': later snapshots exist ({}); delete them first",
                names.join(", ")
            )));
        }

        self.runtime.snapshot_restore(container, name).await
    }

    /// Delete one snapshot. Deleting a nonexistent snapshot is an error.
    pub async fn delete(&self, container: &str, name: &str) -> Result<()> {
        let snapshots = self.runtime.snapshot_list(container).await?;
        if !snapshots.iter().any(|s| s.name == name) {
            return Err(Error::not_found(format!(
                "snapshot '{name}' not found for container '{container}'"
            )));
        }
        self.runtime.snapshot_delete(container, name).await
    }

    /// Delete every snapshot of a container, newest first so each deletion
    /// removes the current tail. Returns the deleted names; an empty result
    /// is the caller's "nothing to delete" no-op.
    pub async fn delete_all(&self, container: &str) -> Result<Vec<String>> {
        let mut snapshots = self.runtime.snapshot_list(container).await?;
        snapshots.reverse();

        let mut deleted = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            self.runtime
                .snapshot_delete(container, &snapshot.name)
                .await?;
            deleted.push(snapshot.name);
        }
        Ok(deleted)
    }
}
