//! `coi snapshot` - checkpoint, roll back, and inspect container state.

use anyhow::Result;
use clap::{Args, Subcommand};
use futures::future::try_join_all;
use serde_json::json;

use crate::error::Error;
use crate::runtime::{ContainerRuntime, InstanceSnapshot};
use crate::snapshot::SnapshotManager;

use super::{confirm, CommandContext, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// Create a snapshot (auto-named when NAME is omitted)
    Create {
        /// Snapshot name
        name: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
        /// Include process memory state in the snapshot
        #[arg(long)]
        stateful: bool,
    },

    /// List snapshots
    List {
        #[command(flatten)]
        target: TargetArgs,
        /// List snapshots for every coi container
        #[arg(long)]
        all: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Restore a container from a snapshot (container must be stopped)
    Restore {
        /// Snapshot name
        name: String,
        #[command(flatten)]
        target: TargetArgs,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete a snapshot
    Delete {
        /// Snapshot name
        name: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
        /// Delete every snapshot of the container
        #[arg(long)]
        all: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show snapshot details
    Info {
        /// Snapshot name
        name: String,
        #[command(flatten)]
        target: TargetArgs,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

/// Container selection shared by all snapshot subcommands.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Container name (default: resolve from COI_CONTAINER or the workspace)
    #[arg(short, long, value_name = "CONTAINER")]
    container: Option<String>,
}

pub async fn run(ctx: &CommandContext, command: SnapshotCommand) -> Result<i32> {
    let manager = SnapshotManager::new(&ctx.runtime);

    match command {
        SnapshotCommand::Create {
            name,
            target,
            stateful,
        } => {
            let container = ctx.resolve_container(target.container.as_deref()).await?;
            let created = manager
                .create(&container, name.as_deref(), stateful)
                .await?;
            if stateful {
                eprintln!("Created stateful snapshot '{created}' for container '{container}'");
            } else {
                eprintln!("Created snapshot '{created}' for container '{container}'");
            }
            Ok(0)
        }

        SnapshotCommand::List {
            target,
            all,
            format,
        } => {
            if all {
                return list_all(ctx, &manager, format).await;
            }
            let container = ctx.resolve_container(target.container.as_deref()).await?;
            let snapshots = manager.list(&container).await?;

            match format {
                OutputFormat::Json => {
                    let output = json!({
                        "container": container,
                        "snapshots": snapshots,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => print_snapshot_table(&container, &snapshots),
            }
            Ok(0)
        }

        SnapshotCommand::Restore {
            name,
            target,
            force,
        } => {
            let container = ctx.resolve_container(target.container.as_deref()).await?;
            // Check existence before prompting so a typo never reaches the
            // confirmation step.
            manager.info(&container, &name).await?;

            if !force {
                eprintln!(
                    "WARNING: This will restore container '{container}' to snapshot '{name}'."
                );
                eprintln!("All changes since the snapshot will be lost.\n");
                if !confirm("Continue?") {
                    eprintln!("Aborted");
                    return Ok(0);
                }
            }

            manager.restore(&container, &name).await?;
            eprintln!("Restored container '{container}' from snapshot '{name}'");
            Ok(0)
        }

        SnapshotCommand::Delete {
            name,
            target,
            all,
            force,
        } => {
            let container = ctx.resolve_container(target.container.as_deref()).await?;
            if all {
                return delete_all(&manager, &container, force).await;
            }

            let Some(name) = name else {
                return Err(Error::validation(
                    "snapshot name required (or use --all to delete all snapshots)",
                )
                .into());
            };

            manager.delete(&container, &name).await?;
            eprintln!("Deleted snapshot '{name}' from container '{container}'");
            Ok(0)
        }

        SnapshotCommand::Info {
            name,
            target,
            format,
        } => {
            let container = ctx.resolve_container(target.container.as_deref()).await?;
            let info = manager.info(&container, &name).await?;

            match format {
                OutputFormat::Json => {
                    let output = json!({
                        "container": container,
                        "snapshot": info,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Snapshot: {}", info.name);
                    println!("Container: {container}");
                    println!("Created: {}", info.created_at.format("%Y-%m-%d %H:%M:%S"));
                    if info.stateful {
                        println!("Stateful: yes (includes process memory)");
                    } else {
                        println!("Stateful: no");
                    }
                }
            }
            Ok(0)
        }
    }
}

async fn list_all(
    ctx: &CommandContext,
    manager: &SnapshotManager<'_>,
    format: OutputFormat,
) -> Result<i32> {
    let containers = ctx.runtime.list(&ctx.global_prefix()).await?;

    if containers.is_empty() {
        eprintln!("No coi containers found");
        return Ok(0);
    }

    // Read-only queries, one per container; safe to run concurrently.
    let listings = try_join_all(
        containers
            .iter()
            .map(|container| manager.list(&container.name)),
    )
    .await?;

    if format == OutputFormat::Json {
        let mut output = serde_json::Map::new();
        for (container, snapshots) in containers.iter().zip(&listings) {
            output.insert(container.name.clone(), json!(snapshots));
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::Value::Object(output))?
        );
        return Ok(0);
    }

    for (container, snapshots) in containers.iter().zip(&listings) {
        println!();
        print_snapshot_table(&container.name, snapshots);
    }
    Ok(0)
}

async fn delete_all(
    manager: &SnapshotManager<'_>,
    container: &str,
    force: bool,
) -> Result<i32> {
    let snapshots = manager.list(container).await?;

    if snapshots.is_empty() {
        eprintln!("No snapshots to delete for container '{container}'");
        return Ok(0);
    }

    if !force {
        eprintln!(
            "WARNING: This will delete ALL {} snapshot(s) for container '{container}':",
            snapshots.len()
        );
        for snapshot in &snapshots {
            eprintln!("  - {}", snapshot.name);
        }
        eprintln!();
        if !confirm("Continue?") {
            eprintln!("Aborted");
            return Ok(0);
        }
    }

    for name in manager.delete_all(container).await? {
        eprintln!("Deleted snapshot '{name}'");
    }
    Ok(0)
}

fn print_snapshot_table(container: &str, snapshots: &[InstanceSnapshot]) {
    println!("Snapshots for {container}:\n");

    if snapshots.is_empty() {
        println!("(none)");
        println!("\nTotal: 0 snapshots");
        return;
    }

    println!("{:<20} {:<24} {:<8}", "NAME", "CREATED", "STATEFUL");
    for snapshot in snapshots {
        println!(
            "{:<20} {:<24} {:<8}",
            snapshot.name,
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            if snapshot.stateful { "yes" } else { "no" },
        );
    }

    let plural = if snapshots.len() == 1 { "" } else { "s" };
    println!("\nTotal: {} snapshot{plural}", snapshots.len());
}
