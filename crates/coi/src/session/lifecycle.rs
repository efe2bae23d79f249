//! Session lifecycle orchestration.
//!
//! Drives launch, resume, and teardown against the container runtime. The
//! interactive part (the user's terminal attached to the tool) happens
//! between [`SessionManager::setup`] and [`SessionManager::finish`]; both
//! halves are plain async calls so the whole lifecycle can be exercised
//! without a terminal.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::identity::{allocate_slot, derive_identity, validate_slot};
use crate::runtime::ContainerRuntime;

use super::events::{self, launch_script};
use super::models::{generate_session_id, LaunchKind, SessionMetadata};
use super::store::SessionStore;

/// Device name of the workspace mount.
const WORKSPACE_DEVICE: &str = "workspace";

/// Options for launching a session.
#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Absolute workspace path.
    pub workspace: PathBuf,
    /// Explicit slot; allocated automatically when absent.
    pub slot: Option<u32>,
    /// Keep the container after detach/exit.
    pub persistent: bool,
    /// Image override.
    pub image: Option<String>,
}

/// A launched session, ready for the interactive phase.
#[derive(Debug, Clone)]
pub struct SetupResult {
    pub session: SessionMetadata,
    pub kind: LaunchKind,
    /// Whether the slot came from the automatic scan.
    pub slot_allocated: bool,
}

/// A resumed session.
#[derive(Debug, Clone)]
pub struct ResumeOutcome {
    pub session: SessionMetadata,
    pub kind: LaunchKind,
    /// Whether the target was picked by auto-detection.
    pub auto_detected: bool,
}

/// Orchestrates the session lifecycle against a container runtime.
pub struct SessionManager<'a> {
    runtime: &'a dyn ContainerRuntime,
    config: &'a AppConfig,
    store: SessionStore,
}

impl<'a> SessionManager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, config: &'a AppConfig, store: SessionStore) -> Self {
        Self {
            runtime,
            config,
            store,
        }
    }

    /// The session store this manager persists into.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// In-container path of the tool's conversation state directory.
    pub fn tool_state_path(&self) -> String {
        format!(
            "/home/{}/{}",
            self.config.tool.user, self.config.tool.state_dir
        )
    }

    /// The supervised launcher script for a session.
    pub fn launch_script_for(&self, session: &SessionMetadata, resume_id: Option<&str>) -> String {
        launch_script(
            &self.config.tool.command,
            &session.id,
            &self.config.container.workspace_target,
            resume_id,
        )
    }

    /// Launch (or reuse) a container for a new session and record its
    /// metadata. Returns with the container running and the slot decided.
    pub async fn setup(&self, opts: SetupOptions) -> Result<SetupResult> {
        let prefix = &self.config.container.prefix;

        let (slot, container, slot_allocated) = match opts.slot {
            Some(slot) => {
                let slot = validate_slot(slot)?;
                let name = derive_identity(prefix, &opts.workspace, slot);
                (slot, name, false)
            }
            None => {
                let (slot, name) = allocate_slot(self.runtime, prefix, &opts.workspace).await?;
                (slot, name, true)
            }
        };

        let kind = match self.runtime.get(&container).await? {
            Some(existing) => {
                if !opts.persistent {
                    return Err(Error::AlreadyExists(format!(
                        "slot {slot} already has container '{container}' - pick another slot or use --persistent to reuse it"
                    )));
                }
                if existing.is_running() {
                    LaunchKind::Reused
                } else {
                    self.runtime.start(&container).await?;
                    self.wait_container_ready(&container).await?;
                    LaunchKind::Restarted
                }
            }
            None => {
                let image = opts.image.as_deref().unwrap_or(&self.config.image.default);
                self.runtime.launch(image, &container).await?;
                // From here on the container exists; never leave it half
                // configured on failure.
                if let Err(err) = self.provision(&container, &opts.workspace).await {
                    self.abort_launch(&container).await;
                    return Err(err);
                }
                LaunchKind::Created
            }
        };

        let session = SessionMetadata {
            id: generate_session_id(),
            container: container.clone(),
            workspace: opts.workspace.display().to_string(),
            slot,
            persistent: opts.persistent,
            created_at: Utc::now(),
            saved_at: None,
        };
        self.store.save(&session)?;

        Ok(SetupResult {
            session,
            kind,
            slot_allocated,
        })
    }

    /// Resume a stored session, restarting or recreating its container as
    /// needed. With no explicit id the most recently created session for the
    /// workspace is auto-detected.
    pub async fn resume(&self, workspace: &Path, id: Option<&str>) -> Result<ResumeOutcome> {
        let (session, auto_detected) = match id {
            Some(id) => (self.store.load(id)?, false),
            None => {
                let latest = self.store.latest_for_workspace(workspace)?.ok_or_else(|| {
                    Error::not_found("no resumable session found for this workspace")
                })?;
                (latest, true)
            }
        };

        let kind = match self.runtime.get(&session.container).await? {
            Some(existing) if existing.is_running() => LaunchKind::Reused,
            Some(_) => {
                self.runtime.start(&session.container).await?;
                self.wait_container_ready(&session.container).await?;
                LaunchKind::Restarted
            }
            None => {
                // The container is gone (ephemeral exit); rebuild it on the
                // same identity and replay the exported conversation state.
                let workspace = PathBuf::from(&session.workspace);
                self.runtime
                    .launch(&self.config.image.default, &session.container)
                    .await?;
                if let Err(err) = self.provision(&session.container, &workspace).await {
                    self.abort_launch(&session.container).await;
                    return Err(err);
                }
                if let Err(err) = self.import_state(&session).await {
                    self.abort_launch(&session.container).await;
                    return Err(err);
                }
                LaunchKind::Created
            }
        };

        Ok(ResumeOutcome {
            session,
            kind,
            auto_detected,
        })
    }

    /// Tear down after the interactive phase.
    ///
    /// Persistent sessions keep their container. Ephemeral sessions export
    /// the conversation state to the store, then delete the container; on
    /// export failure the container is kept so no state is lost.
    pub async fn finish(&self, session: &SessionMetadata) -> Result<()> {
        if session.persistent {
            return Ok(());
        }

        self.export_state(session).await?;

        if self.runtime.is_running(&session.container).await? {
            self.runtime.stop(&session.container, true).await?;
        }
        self.runtime.delete(&session.container, true).await?;
        Ok(())
    }

    /// Block until the container accepts exec, or time out.
    pub async fn wait_container_ready(&self, container: &str) -> Result<()> {
        let timeout = Duration::from_secs(self.config.timeouts.container_ready);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.runtime.exec_capture(container, None, "true").await {
                Ok(out) if out.success() => return Ok(()),
                // A dead daemon will not come back within this wait.
                Err(err @ Error::RuntimeUnavailable(_)) => return Err(err),
                Ok(_) | Err(_) => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Runtime {
                    command: "wait-ready".to_string(),
                    message: format!(
                        "container '{container}' did not become ready within {}s",
                        timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Block until the supervised tool reports ready for this session, or
    /// time out.
    pub async fn wait_tool_ready(&self, session: &SessionMetadata) -> Result<()> {
        let timeout = Duration::from_secs(self.config.timeouts.tool_ready);
        let deadline = tokio::time::Instant::now() + timeout;
        let read_log = format!("cat {} 2>/dev/null || true", events::EVENTS_PATH);

        loop {
            let out = self
                .runtime
                .exec_capture(&session.container, Some(&self.config.tool.user), &read_log)
                .await?;
            if events::saw_ready(&out.stdout, &session.id) {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Runtime {
                    command: "wait-tool-ready".to_string(),
                    message: format!(
                        "tool did not report ready for session '{}' within {}s",
                        session.id,
                        timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Mount the workspace and wait for the container to accept exec.
    async fn provision(&self, container: &str, workspace: &Path) -> Result<()> {
        self.runtime
            .mount(
                container,
                WORKSPACE_DEVICE,
                workspace,
                &self.config.container.workspace_target,
                false,
                true,
            )
            .await?;
        self.wait_container_ready(container).await
    }

    /// Best-effort teardown of a container that failed mid-launch, so a
    /// partial failure never leaves it stuck half-created.
    async fn abort_launch(&self, container: &str) {
        if let Err(err) = self.runtime.delete(container, true).await {
            warn!("could not clean up container '{container}' after failed launch: {err}");
        }
    }

    /// Copy the tool's conversation state out of the container into the
    /// store and stamp the metadata.
    async fn export_state(&self, session: &SessionMetadata) -> Result<()> {
        let state_dir = self.store.state_dir(&session.id);
        fs::create_dir_all(&state_dir)?;

        self.runtime
            .file_pull(&session.container, &self.tool_state_path(), &state_dir)
            .await?;

        let mut saved = session.clone();
        saved.saved_at = Some(Utc::now());
        self.store.save(&saved)
    }

    /// Push previously exported conversation state back into a fresh
    /// container.
    async fn import_state(&self, session: &SessionMetadata) -> Result<()> {
        let exported = self
            .store
            .state_dir(&session.id)
            .join(&self.config.tool.state_dir);
        if !exported.exists() {
            debug!(
                "no exported state for session '{}'; resuming with a clean container",
                session.id
            );
            return Ok(());
        }

        let home = format!("/home/{}/", self.config.tool.user);
        self.runtime
            .file_push(&session.container, &exported, &home)
            .await
    }
}
