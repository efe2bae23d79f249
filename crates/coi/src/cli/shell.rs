//! `coi shell` - launch or resume an interactive session.

use anyhow::Result;
use clap::Args;
use tracing::debug;

use crate::error::Error;
use crate::mux::MuxManager;
use crate::runtime::ContainerRuntime;
use crate::session::{LaunchKind, SessionManager, SessionMetadata, SetupOptions};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ShellArgs {
    /// Slot number (default: first free slot)
    #[arg(long, value_name = "N")]
    slot: Option<u32>,

    /// Keep the container running after detach or exit
    #[arg(long)]
    persistent: bool,

    /// Run inside a detachable multiplexer session (implies --persistent)
    #[arg(long)]
    tmux: bool,

    /// Resume a previous session; latest for this workspace when no id given
    #[arg(long, value_name = "ID", num_args = 0..=1, default_missing_value = "")]
    resume: Option<String>,

    /// Alias for --resume
    #[arg(long = "continue", value_name = "ID", num_args = 0..=1, default_missing_value = "")]
    continue_session: Option<String>,

    /// Container image override
    #[arg(long, value_name = "IMAGE")]
    image: Option<String>,
}

pub async fn run(ctx: &CommandContext, args: ShellArgs, debug_shell: bool) -> Result<i32> {
    let resume_target = match (args.resume, args.continue_session) {
        (Some(_), Some(_)) => {
            return Err(
                Error::validation("--continue is an alias for --resume; pass only one").into(),
            )
        }
        (resume, cont) => resume.or(cont),
    };

    let store = ctx.store()?;
    let manager = SessionManager::new(&ctx.runtime, &ctx.config, store);
    let mux = MuxManager::new(&ctx.runtime, &ctx.config.tool.user);
    let persistent = args.persistent || args.tmux;

    match resume_target {
        Some(id) => {
            let id = Some(id).filter(|id| !id.is_empty());
            resume_session(ctx, &manager, &mux, id.as_deref(), debug_shell).await
        }
        None => {
            launch_session(
                ctx,
                &manager,
                &mux,
                args.slot,
                persistent,
                args.image,
                debug_shell,
            )
            .await
        }
    }
}

async fn launch_session(
    ctx: &CommandContext,
    manager: &SessionManager<'_>,
    mux: &MuxManager<'_>,
    slot: Option<u32>,
    persistent: bool,
    image: Option<String>,
    debug_shell: bool,
) -> Result<i32> {
    let result = manager
        .setup(SetupOptions {
            workspace: ctx.workspace.clone(),
            slot,
            persistent,
            image,
        })
        .await?;

    let session = &result.session;
    if result.slot_allocated {
        eprintln!("Auto-allocated slot {}", session.slot);
    } else {
        eprintln!("Using slot {}", session.slot);
    }

    match result.kind {
        LaunchKind::Created => eprintln!("Launched container '{}'", session.container),
        LaunchKind::Reused => eprintln!("Reusing running container '{}'", session.container),
        LaunchKind::Restarted => eprintln!("Restarting container '{}'", session.container),
    }

    let script = session_script(ctx, manager, session, None, debug_shell);
    run_interactive(ctx, manager, mux, session, &script).await
}

async fn resume_session(
    ctx: &CommandContext,
    manager: &SessionManager<'_>,
    mux: &MuxManager<'_>,
    id: Option<&str>,
    debug_shell: bool,
) -> Result<i32> {
    let outcome = manager.resume(&ctx.workspace, id).await?;
    let session = &outcome.session;

    if outcome.auto_detected {
        eprintln!("Auto-detected session: {}", session.id);
    }

    match outcome.kind {
        LaunchKind::Reused => eprintln!("Reusing running container '{}'", session.container),
        LaunchKind::Restarted => eprintln!("Restarting container '{}'", session.container),
        LaunchKind::Created => eprintln!(
            "Recreated container '{}' with saved session state",
            session.container
        ),
    }

    let script = session_script(ctx, manager, session, Some(&session.id), debug_shell);
    run_interactive(ctx, manager, mux, session, &script).await
}

/// The script the interactive phase runs: the supervised tool, or a plain
/// shell in the workspace when debugging.
fn session_script(
    ctx: &CommandContext,
    manager: &SessionManager<'_>,
    session: &SessionMetadata,
    resume_id: Option<&str>,
    debug_shell: bool,
) -> String {
    if debug_shell {
        format!("cd {} && exec bash", ctx.config.container.workspace_target)
    } else {
        manager.launch_script_for(session, resume_id)
    }
}

/// Block on the interactive phase, then tear down (ephemeral) or report how
/// to come back (persistent).
async fn run_interactive(
    ctx: &CommandContext,
    manager: &SessionManager<'_>,
    mux: &MuxManager<'_>,
    session: &SessionMetadata,
    script: &str,
) -> Result<i32> {
    let code = if session.persistent {
        mux.launch(&session.container, script).await?
    } else {
        ctx.runtime
            .exec_interactive(&session.container, Some(&ctx.config.tool.user), script)
            .await?
    };
    debug!("interactive phase ended with code {code}");

    if session.persistent {
        eprintln!(
            "Container '{}' is still running; reconnect with 'coi attach --slot {}' or 'coi shell --resume={}'",
            session.container, session.slot, session.id
        );
    } else {
        manager.finish(session).await?;
        eprintln!("Saved session {}", session.id);
    }

    Ok(0)
}
