//! Configuration loading and defaults.
//!
//! Settings come from `~/.coi/config.toml` merged with `COI__`-prefixed
//! environment variables (`COI__TOOL__COMMAND=...`). A default config file is
//! written on first use so the knobs are discoverable.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for config overrides.
const ENV_PREFIX: &str = "COI";

/// Container image settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image used for session containers.
    pub default: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            default: "coi".to_string(),
        }
    }
}

/// Container naming and mount settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Name prefix for every container this engine owns.
    pub prefix: String,
    /// Mount target for the workspace inside the container.
    pub workspace_target: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            prefix: "coi".to_string(),
            workspace_target: "/workspace".to_string(),
        }
    }
}

/// The supervised coding-assistant tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Command started inside the container.
    pub command: String,
    /// In-container account the tool runs as.
    pub user: String,
    /// Directory under the tool user's home holding conversation state.
    pub state_dir: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            user: "coder".to_string(),
            state_dir: ".claude".to_string(),
        }
    }
}

/// Timeouts for external runtime calls, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Waiting for a launched container to accept exec.
    pub container_ready: u64,
    /// Waiting for the supervised tool to report ready.
    pub tool_ready: u64,
    /// Captured exec calls.
    pub exec: u64,
    /// Snapshot create/restore/delete calls.
    pub snapshot: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            container_ready: 60,
            tool_ready: 120,
            exec: 120,
            snapshot: 120,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub image: ImageConfig,
    pub container: ContainerConfig,
    pub tool: ToolConfig,
    pub timeouts: TimeoutConfig,
    /// Base directory for engine state. Defaults to `~/.coi`.
    pub base_dir: Option<String>,
}

impl AppConfig {
    /// Load configuration, writing the default file if absent.
    pub fn load() -> Result<Self> {
        let base = default_base_dir()?;
        Self::load_from(&base)
    }

    /// Load configuration rooted at an explicit base directory.
    pub fn load_from(base_dir: &Path) -> Result<Self> {
        let config_file = base_dir.join("config.toml");
        if !config_file.exists() {
            write_default_config(&config_file)?;
        }

        let built = Config::builder()
            .add_source(
                File::from(config_file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                // Only double-underscore vars (COI__TOOL__COMMAND) are
                // config overrides; COI_CONTAINER and friends are runtime
                // inputs, not settings.
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("building configuration")?;

        let mut config: AppConfig = built
            .try_deserialize()
            .context("deserializing configuration")?;

        if config.base_dir.is_none() {
            config.base_dir = Some(base_dir.display().to_string());
        }

        Ok(config)
    }

    /// Base directory for engine state.
    pub fn base_dir(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(dir) => expand_str_path(dir),
            None => default_base_dir(),
        }
    }

    /// Directory holding saved session state, scoped per tool so switching
    /// the assistant command never mixes conversation formats.
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        Ok(self.base_dir()?.join("sessions").join(&self.tool.command))
    }
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::from("# Configuration for coi\n# File: ");
    body.push_str(&path.display().to_string());
    body.push_str("\n\n");
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_base_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("COI_BASE_DIR").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::home_dir()
        .map(|home| home.join(".coi"))
        .ok_or_else(|| anyhow!("unable to determine home directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.container.prefix, "coi");
        assert_eq!(config.container.workspace_target, "/workspace");
        assert_eq!(config.tool.state_dir, ".claude");
        assert_eq!(config.timeouts.container_ready, 60);
    }

    #[test]
    fn load_writes_default_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();

        assert!(dir.path().join("config.toml").exists());
        assert_eq!(config.image.default, "coi");
        let sessions = config.sessions_dir().unwrap();
        assert!(sessions.ends_with("sessions/claude"));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "[tool]\ncommand = \"aider\"\nuser = \"dev\"\nstate_dir = \".aider\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.tool.command, "aider");
        // Untouched sections keep their defaults.
        assert_eq!(config.container.prefix, "coi");
    }
}
