//! `coi container` - thin pass-through to the container runtime.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use crate::runtime::{shell_quote, ContainerRuntime};

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum ContainerCommand {
    /// Create and start a container from an image
    Launch {
        /// Image name
        image: String,
        /// Container name
        name: String,
    },

    /// Start a stopped container
    Start {
        /// Container name
        name: String,
    },

    /// Stop a running container
    Stop {
        /// Container name
        name: String,
        /// Stop without waiting for a clean shutdown
        #[arg(long)]
        force: bool,
    },

    /// Delete a container
    Delete {
        /// Container name
        name: String,
        /// Delete even if running
        #[arg(short, long)]
        force: bool,
    },

    /// Run a command inside a container
    Exec {
        /// Container name
        name: String,
        /// Capture output and print it as JSON
        #[arg(long)]
        capture: bool,
        /// In-container user to run as
        #[arg(long, value_name = "USER")]
        user: Option<String>,
        /// Command and arguments (after --)
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Mount a host directory into a container
    Mount {
        /// Container name
        name: String,
        /// Device name for the mount
        device: String,
        /// Host source directory
        source: PathBuf,
        /// Target path inside the container
        target: String,
        /// Mount read-only
        #[arg(long)]
        readonly: bool,
        /// Shift ownership to match container ids
        #[arg(long)]
        shift: bool,
    },
}

pub async fn run(ctx: &CommandContext, command: ContainerCommand) -> Result<i32> {
    match command {
        ContainerCommand::Launch { image, name } => {
            ctx.runtime.launch(&image, &name).await?;
            eprintln!("Launched container '{name}' from image '{image}'");
            Ok(0)
        }

        ContainerCommand::Start { name } => {
            ctx.runtime.start(&name).await?;
            Ok(0)
        }

        ContainerCommand::Stop { name, force } => {
            ctx.runtime.stop(&name, force).await?;
            Ok(0)
        }

        ContainerCommand::Delete { name, force } => {
            ctx.runtime.delete(&name, force).await?;
            Ok(0)
        }

        ContainerCommand::Exec {
            name,
            capture,
            user,
            command,
        } => {
            let script = command
                .iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" ");

            if capture {
                let output = ctx
                    .runtime
                    .exec_capture(&name, user.as_deref(), &script)
                    .await?;
                let payload = json!({
                    "stdout": output.stdout,
                    "stderr": output.stderr,
                    "exit_code": output.exit_code,
                });
                println!("{}", serde_json::to_string(&payload)?);
                Ok(output.exit_code.max(0))
            } else {
                let code = ctx
                    .runtime
                    .exec_interactive(&name, user.as_deref(), &script)
                    .await?;
                Ok(code.max(0))
            }
        }

        ContainerCommand::Mount {
            name,
            device,
            source,
            target,
            readonly,
            shift,
        } => {
            let source = std::path::absolute(&source)?;
            ctx.runtime
                .mount(&name, &device, &source, &target, readonly, shift)
                .await?;
            Ok(0)
        }
    }
}
