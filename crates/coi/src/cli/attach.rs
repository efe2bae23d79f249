//! `coi attach` - reconnect to a running session.

use anyhow::Result;
use clap::Args;

use crate::error::Error;
use crate::identity;
use crate::mux::MuxManager;
use crate::runtime::ContainerRuntime;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct AttachArgs {
    /// Attach to this workspace slot's session
    #[arg(long, value_name = "N", conflicts_with = "container")]
    slot: Option<u32>,

    /// Container name to attach to
    container: Option<String>,
}

pub async fn run(ctx: &CommandContext, args: AttachArgs) -> Result<i32> {
    let mux = MuxManager::new(&ctx.runtime, &ctx.config.tool.user);

    // An explicit target (slot or name) must connect to exactly that
    // session, never another one that happens to be running.
    let target = match (args.container, args.slot) {
        (Some(name), _) => Some(name),
        (None, Some(slot)) => {
            let slot = identity::validate_slot(slot)?;
            Some(identity::derive_identity(
                &ctx.config.container.prefix,
                &ctx.workspace,
                slot,
            ))
        }
        (None, None) => None,
    };

    if let Some(name) = target {
        if !ctx.runtime.is_running(&name).await? {
            return Err(Error::not_found(format!(
                "container '{name}' not found or not running"
            ))
            .into());
        }
        let code = mux.attach(&name).await?;
        return Ok(code.max(0));
    }

    // No target: attach if exactly one session is running, otherwise list.
    let running: Vec<_> = ctx
        .runtime
        .list(&ctx.global_prefix())
        .await?
        .into_iter()
        .filter(|i| i.is_running())
        .collect();

    match running.len() {
        0 => {
            println!("No active sessions");
            Ok(0)
        }
        1 => {
            eprintln!("Attaching to {}...", running[0].name);
            let code = mux.attach(&running[0].name).await?;
            Ok(code.max(0))
        }
        _ => {
            println!("Active sessions:");
            for instance in &running {
                println!("  {}", instance.name);
            }
            println!("\nUse: coi attach <container> or coi attach --slot N");
            Ok(0)
        }
    }
}
