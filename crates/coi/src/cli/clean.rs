//! `coi clean` - remove stopped containers and saved session data.

use anyhow::Result;
use clap::Args;

use crate::runtime::ContainerRuntime;

use super::{confirm, CommandContext};

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Clean containers and saved sessions
    #[arg(long)]
    all: bool,

    /// Clean saved session data
    #[arg(long)]
    sessions: bool,

    /// Skip confirmation prompts
    #[arg(long)]
    force: bool,

    /// Show what would be cleaned without making changes
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(ctx: &CommandContext, args: CleanArgs) -> Result<i32> {
    let mut cleaned = 0;

    // Containers unless only sessions were requested.
    if args.all || !args.sessions {
        eprintln!("Checking for stopped coi containers...");

        let stopped: Vec<_> = ctx
            .runtime
            .list(&ctx.global_prefix())
            .await?
            .into_iter()
            .filter(|i| i.is_stopped())
            .collect();

        if stopped.is_empty() {
            eprintln!("  (no stopped containers found)");
        } else {
            eprintln!("Found {} stopped container(s):", stopped.len());
            for instance in &stopped {
                eprintln!("  - {}", instance.name);
            }

            if !args.dry_run {
                if !args.force && !confirm("\nDelete these containers?") {
                    eprintln!("Cancelled.");
                    return Ok(0);
                }
                for instance in &stopped {
                    eprintln!("Deleting container {}...", instance.name);
                    match ctx.runtime.delete(&instance.name, true).await {
                        Ok(()) => cleaned += 1,
                        Err(err) => {
                            eprintln!("Warning: failed to delete {}: {err}", instance.name)
                        }
                    }
                }
            }
        }
    }

    if args.all || args.sessions {
        eprintln!("\nChecking for saved session data...");

        let store = ctx.store()?;
        let sessions = store.list()?;

        if sessions.is_empty() {
            eprintln!("  (no saved sessions found)");
        } else {
            eprintln!("Found {} session(s):", sessions.len());
            for session in &sessions {
                eprintln!("  - {}", session.id);
            }

            if !args.dry_run {
                if !args.force && !confirm("\nDelete all session data?") {
                    eprintln!("Cancelled.");
                    return Ok(0);
                }
                for session in &sessions {
                    eprintln!("Deleting session {}...", session.id);
                    match store.delete(&session.id) {
                        Ok(()) => cleaned += 1,
                        Err(err) => {
                            eprintln!("Warning: failed to delete {}: {err}", session.id)
                        }
                    }
                }
            }
        }
    }

    if args.dry_run {
        eprintln!("\n[Dry run] No changes made.");
    } else if cleaned > 0 {
        eprintln!("\nCleaned {cleaned} item(s)");
    } else {
        eprintln!("\nNothing to clean.");
    }

    Ok(0)
}
