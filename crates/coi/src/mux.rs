//! Terminal multiplexer sessions inside containers.
//!
//! Each persistent session runs its tool inside a tmux session keyed by the
//! container identity (one multiplexer session per container, fixed name).
//! Detaching is tmux's own prefix gesture (`C-b d`), intercepted by the
//! multiplexer and never seen by the tool, so the process and its
//! conversation state survive any number of detach/reattach cycles. The
//! multiplexer session dies only with its process or its container.

use crate::error::{Error, Result};
use crate::runtime::{shell_quote, ContainerRuntime};

/// Fixed tmux session name inside each container. Identity lives in the
/// container name, so one session per container is enough.
const MUX_SESSION: &str = "coi";

/// Shell script that creates-or-attaches the multiplexer session running
/// `inner`.
pub fn new_session_script(inner: &str) -> String {
    format!(
        "tmux new-session -A -s {MUX_SESSION} {}",
        shell_quote(inner)
    )
}

/// Shell script that attaches to the existing multiplexer session.
pub fn attach_script() -> String {
    format!("tmux attach -t {MUX_SESSION}")
}

/// Shell script probing for the multiplexer session.
fn has_session_script() -> String {
    format!("tmux has-session -t {MUX_SESSION} 2>/dev/null")
}

/// Attach/detach manager for multiplexed sessions.
pub struct MuxManager<'a> {
    runtime: &'a dyn ContainerRuntime,
    user: String,
}

impl<'a> MuxManager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, user: impl Into<String>) -> Self {
        Self {
            runtime,
            user: user.into(),
        }
    }

    /// Create the multiplexer session running `inner`, or attach to it if it
    /// already exists, with the caller's terminal bound to it. Blocks until
    /// the tool exits or the user detaches; returns the exec's exit code.
    pub async fn launch(&self, container: &str, inner: &str) -> Result<i32> {
        self.runtime
            .exec_interactive(container, Some(&self.user), &new_session_script(inner))
            .await
    }

    /// Reattach the caller's terminal to the existing multiplexer session
    /// without restarting anything inside it.
    pub async fn attach(&self, container: &str) -> Result<i32> {
        if !self.has_session(container).await? {
            return Err(Error::not_found(format!(
                "no active session in container '{container}'"
            )));
        }
        self.runtime
            .exec_interactive(container, Some(&self.user), &attach_script())
            .await
    }

    /// Whether a multiplexer session is alive in this container. A stopped
    /// container has none.
    pub async fn has_session(&self, container: &str) -> Result<bool> {
        let probe = self
            .runtime
            .exec_capture(container, Some(&self.user), &has_session_script())
            .await?;
        Ok(probe.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_script_quotes_inner_command() {
        let script = new_session_script("claude --session-id 'abc'");
        assert!(script.starts_with("tmux new-session -A -s coi "));
        assert!(script.contains("claude --session-id"));
    }

    #[test]
    fn attach_targets_the_fixed_session() {
        assert_eq!(attach_script(), "tmux attach -t coi");
    }
}
