//! Container runtime adapter.
//!
//! Provides an async interface to the Incus CLI. The engine never talks to
//! the runtime daemon directly; everything goes through [`ContainerRuntime`]
//! so the orchestration logic can be driven against an in-memory runtime in
//! tests.

mod types;

pub use types::{ExecOutput, Instance, InstanceSnapshot};

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Container runtime abstraction.
///
/// Name-collision arbitration is the runtime's job: creating two containers
/// with the same name results in exactly one success, which is what makes
/// advisory slot scanning safe to race (see the slot allocator).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container from an image.
    async fn launch(&self, image: &str, name: &str) -> Result<()>;

    /// Start a stopped container.
    async fn start(&self, name: &str) -> Result<()>;

    /// Stop a running container.
    async fn stop(&self, name: &str, force: bool) -> Result<()>;

    /// Delete a container.
    async fn delete(&self, name: &str, force: bool) -> Result<()>;

    /// List containers whose names start with `prefix`, any state.
    async fn list(&self, prefix: &str) -> Result<Vec<Instance>>;

    /// Look up a single container by exact name.
    async fn get(&self, name: &str) -> Result<Option<Instance>>;

    /// Run a shell script inside a container and capture its output.
    async fn exec_capture(
        &self,
        name: &str,
        user: Option<&str>,
        script: &str,
    ) -> Result<ExecOutput>;

    /// Run a shell script inside a container with the caller's terminal
    /// attached. Blocks until the script exits; returns its exit code.
    async fn exec_interactive(&self, name: &str, user: Option<&str>, script: &str) -> Result<i32>;

    /// Attach a host directory into a container as a disk device.
    async fn mount(
        &self,
        name: &str,
        device: &str,
        source: &Path,
        target: &str,
        readonly: bool,
        shift: bool,
    ) -> Result<()>;

    /// Recursively copy a path out of a container to the host.
    async fn file_pull(&self, name: &str, source: &str, dest: &Path) -> Result<()>;

    /// Recursively copy a host path into a container.
    async fn file_push(&self, name: &str, source: &Path, dest: &str) -> Result<()>;

    /// Create a snapshot of a container's writable layer.
    async fn snapshot_create(&self, name: &str, snapshot: &str, stateful: bool) -> Result<()>;

    /// List a container's snapshots in creation order.
    async fn snapshot_list(&self, name: &str) -> Result<Vec<InstanceSnapshot>>;

    /// Restore a container's writable layer from a snapshot.
    async fn snapshot_restore(&self, name: &str, snapshot: &str) -> Result<()>;

    /// Delete a snapshot.
    async fn snapshot_delete(&self, name: &str, snapshot: &str) -> Result<()>;

    /// Whether a container with this exact name exists, any state.
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.is_some())
    }

    /// Whether a container with this exact name exists and is running.
    async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.is_some_and(|i| i.is_running()))
    }
}

/// Validate a container name before handing it to the runtime CLI.
pub fn validate_container_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("container name cannot be empty"));
    }

    if name.len() > 63 {
        return Err(Error::validation(format!(
            "container name '{name}' exceeds 63 characters"
        )));
    }

    let valid = |c: char| c.is_ascii_alphanumeric() || c == '-';
    if !name.chars().all(valid) {
        return Err(Error::validation(format!(
            "container name '{name}' contains invalid characters"
        )));
    }

    Ok(())
}

/// Quote a string for safe interpolation into a `sh -c` script.
pub fn shell_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Incus CLI client implementing [`ContainerRuntime`].
#[derive(Debug, Clone)]
pub struct IncusCli {
    binary: String,
    /// Timeout for each captured CLI call.
    call_timeout: Duration,
    /// Timeout for snapshot operations, which copy container storage and can
    /// legitimately take longer than other calls.
    snapshot_timeout: Duration,
}

impl Default for IncusCli {
    fn default() -> Self {
        Self::new()
    }
}

impl IncusCli {
    pub fn new() -> Self {
        Self {
            binary: "incus".to_string(),
            call_timeout: Duration::from_secs(120),
            snapshot_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeouts(mut self, call: Duration, snapshot: Duration) -> Self {
        self.call_timeout = call;
        self.snapshot_timeout = snapshot;
        self
    }

    /// Run an incus subcommand and capture its output.
    async fn run(&self, args: &[&str]) -> Result<String> {
        self.run_with(self.call_timeout, args).await
    }

    /// Run an incus subcommand with an explicit timeout.
    ///
    /// The timeout bounds the call; an elapsed timeout surfaces as a runtime
    /// error naming the subcommand, never a hang.
    async fn run_with(&self, timeout: Duration, args: &[&str]) -> Result<String> {
        let command = args.first().copied().unwrap_or("incus");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| Error::Runtime {
                command: command.to_string(),
                message: format!("timed out after {}s", timeout.as_secs()),
            })?
            .map_err(|e| spawn_error(&self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(command, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Wrap a script so it runs as the requested in-container user.
    fn user_script(user: Option<&str>, script: &str) -> Vec<String> {
        match user {
            Some(user) => vec![
                "su".to_string(),
                "-".to_string(),
                user.to_string(),
                "-c".to_string(),
                script.to_string(),
            ],
            None => vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
            ],
        }
    }
}

/// Map a failed-to-spawn error. A missing binary or denied socket means the
/// runtime as a whole is unusable, not that one operation failed.
fn spawn_error(binary: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::RuntimeUnavailable(format!("'{binary}' binary not found in PATH"))
    } else {
        Error::RuntimeUnavailable(err.to_string())
    }
}

/// Classify a nonzero CLI exit by its stderr.
///
/// The runtime is the authority on existence and name collisions, so its
/// wording is what distinguishes retryable daemon trouble from fatal
/// not-found / conflict outcomes.
fn classify_failure(command: &str, stderr: &str) -> Error {
    let lower = stderr.to_lowercase();

    if lower.contains("not found") || lower.contains("no such") {
        Error::NotFound(stderr.to_string())
    } else if lower.contains("already exists") {
        Error::AlreadyExists(stderr.to_string())
    } else if lower.contains("connection refused")
        || lower.contains("cannot connect")
        || lower.contains("connect to unix socket")
        || lower.contains("permission denied")
    {
        Error::RuntimeUnavailable(stderr.to_string())
    } else {
        Error::Runtime {
            command: command.to_string(),
            message: stderr.to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for IncusCli {
    async fn launch(&self, image: &str, name: &str) -> Result<()> {
        validate_container_name(name)?;
        self.run(&["launch", image, name]).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        self.run(&["start", name]).await?;
        Ok(())
    }

    async fn stop(&self, name: &str, force: bool) -> Result<()> {
        validate_container_name(name)?;
        let mut args = vec!["stop", name];
        if force {
            args.push("--force");
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn delete(&self, name: &str, force: bool) -> Result<()> {
        validate_container_name(name)?;
        let mut args = vec!["delete", name];
        if force {
            args.push("--force");
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Instance>> {
        let filter = format!("^{prefix}");
        let output = self.run(&["list", &filter, "--format", "json"]).await?;
        serde_json::from_str(&output)
            .map_err(|e| Error::Runtime {
                command: "list".to_string(),
                message: format!("unparseable instance list: {e}"),
            })
    }

    async fn get(&self, name: &str) -> Result<Option<Instance>> {
        validate_container_name(name)?;
        let filter = format!("^{name}$");
        let output = self.run(&["list", &filter, "--format", "json"]).await?;
        let instances: Vec<Instance> = serde_json::from_str(&output).map_err(|e| Error::Runtime {
            command: "list".to_string(),
            message: format!("unparseable instance list: {e}"),
        })?;
        Ok(instances.into_iter().find(|i| i.name == name))
    }

    async fn exec_capture(
        &self,
        name: &str,
        user: Option<&str>,
        script: &str,
    ) -> Result<ExecOutput> {
        validate_container_name(name)?;

        let inner = Self::user_script(user, script);
        let mut args = vec!["exec", name, "--"];
        args.extend(inner.iter().map(String::as_str));

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.call_timeout, child)
            .await
            .map_err(|_| Error::Runtime {
                command: "exec".to_string(),
                message: format!("timed out after {}s", self.call_timeout.as_secs()),
            })?
            .map_err(|e| spawn_error(&self.binary, e))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn exec_interactive(&self, name: &str, user: Option<&str>, script: &str) -> Result<i32> {
        validate_container_name(name)?;

        let inner = Self::user_script(user, script);
        let mut args = vec!["exec", "-t", name, "--"];
        args.extend(inner.iter().map(String::as_str));

        // Inherit the caller's terminal; no timeout on interactive sessions.
        let status = Command::new(&self.binary)
            .args(&args)
            .status()
            .await
            .map_err(|e| spawn_error(&self.binary, e))?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn mount(
        &self,
        name: &str,
        device: &str,
        source: &Path,
        target: &str,
        readonly: bool,
        shift: bool,
    ) -> Result<()> {
        validate_container_name(name)?;

        let source_arg = format!("source={}", source.display());
        let path_arg = format!("path={target}");
        let mut args = vec![
            "config", "device", "add", name, device, "disk",
            source_arg.as_str(),
            path_arg.as_str(),
        ];
        if readonly {
            args.push("readonly=true");
        }
        if shift {
            args.push("shift=true");
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn file_pull(&self, name: &str, source: &str, dest: &Path) -> Result<()> {
        validate_container_name(name)?;
        let from = format!("{name}{source}");
        let to = dest.display().to_string();
        self.run(&["file", "pull", "-r", &from, &to]).await?;
        Ok(())
    }

    async fn file_push(&self, name: &str, source: &Path, dest: &str) -> Result<()> {
        validate_container_name(name)?;
        let from = source.display().to_string();
        let to = format!("{name}{dest}");
        self.run(&["file", "push", "-r", &from, &to]).await?;
        Ok(())
    }

    async fn snapshot_create(&self, name: &str, snapshot: &str, stateful: bool) -> Result<()> {
        validate_container_name(name)?;
        let mut args = vec!["snapshot", "create", name, snapshot];
        if stateful {
            args.push("--stateful");
        }
        self.run_with(self.snapshot_timeout, &args).await?;
        Ok(())
    }

    async fn snapshot_list(&self, name: &str) -> Result<Vec<InstanceSnapshot>> {
        validate_container_name(name)?;
        let endpoint = format!("/1.0/instances/{name}/snapshots?recursion=1");
        let output = self.run(&["query", &endpoint]).await?;
        let mut snapshots: Vec<InstanceSnapshot> =
            serde_json::from_str(&output).map_err(|e| Error::Runtime {
                command: "query".to_string(),
                message: format!("unparseable snapshot list: {e}"),
            })?;
        snapshots.sort_by_key(|s| s.created_at);
        Ok(snapshots)
    }

    async fn snapshot_restore(&self, name: &str, snapshot: &str) -> Result<()> {
        validate_container_name(name)?;
        self.run_with(self.snapshot_timeout, &["snapshot", "restore", name, snapshot])
            .await?;
        Ok(())
    }

    async fn snapshot_delete(&self, name: &str, snapshot: &str) -> Result<()> {
        validate_container_name(name)?;
        self.run_with(self.snapshot_timeout, &["snapshot", "delete", name, snapshot])
            .await?;
        Ok(())
    }
}
