//! `coi list` - show active containers and saved sessions.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::runtime::ContainerRuntime;

use super::{CommandContext, OutputFormat};

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Also show saved sessions
    #[arg(long)]
    all: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

pub async fn run(ctx: &CommandContext, args: ListArgs) -> Result<i32> {
    let containers = ctx.runtime.list(&ctx.global_prefix()).await?;
    let sessions = if args.all {
        Some(ctx.store()?.list()?)
    } else {
        None
    };

    if args.format == OutputFormat::Json {
        let mut output = json!({
            "containers": containers
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name,
                        "status": c.status,
                        "created_at": c.created_at,
                    })
                })
                .collect::<Vec<_>>(),
        });
        if let Some(sessions) = &sessions {
            output["sessions"] = json!(sessions);
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(0);
    }

    println!("Active Containers:");
    println!("------------------");
    if containers.is_empty() {
        println!("  (none)");
    } else {
        for container in &containers {
            println!("  {}", container.name);
            println!("    Status: {}", container.status);
            if let Some(created) = container.created_at {
                println!("    Created: {}", created.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }

    if let Some(sessions) = sessions {
        println!();
        println!("Saved Sessions:");
        println!("---------------");
        if sessions.is_empty() {
            println!("  (none)");
        } else {
            for session in sessions {
                println!("  {}", session.id);
                println!("    Created: {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
                if let Some(saved) = session.saved_at {
                    println!("    Saved: {}", saved.format("%Y-%m-%d %H:%M:%S"));
                }
                println!("    Workspace: {}", session.workspace);
            }
        }
    }

    Ok(0)
}
