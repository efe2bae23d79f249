//! Command-line interface.
//!
//! Argument parsing with clap and thin handlers that wire the engine
//! components together. Progress and confirmations go to stderr; command
//! output (tables, JSON) goes to stdout.

mod attach;
mod clean;
mod container;
mod list;
mod shell;
mod snapshot;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

use crate::config::AppConfig;
use crate::error::Error;
use crate::identity;
use crate::runtime::IncusCli;
use crate::session::SessionStore;

/// Environment variable naming the target container for snapshot and
/// container subcommands.
pub const CONTAINER_ENV: &str = "COI_CONTAINER";

#[derive(Debug, Parser)]
#[command(
    name = "coi",
    version,
    about = "Isolated, resumable AI coding sessions in Incus containers."
)]
pub struct Cli {
    /// Workspace directory (default: current directory)
    #[arg(long, short = 'w', global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Verbose debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start an interactive session in a container
    Shell(shell::ShellArgs),

    /// Attach to a running session's terminal
    Attach(attach::AttachArgs),

    /// List active containers and saved sessions
    List(list::ListArgs),

    /// Manage container snapshots
    Snapshot {
        #[command(subcommand)]
        command: snapshot::SnapshotCommand,
    },

    /// Low-level container operations
    Container {
        #[command(subcommand)]
        command: container::ContainerCommand,
    },

    /// Clean up stopped containers and saved sessions
    Clean(clean::CleanArgs),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: CompletionShell,
    },
}

/// Output format for list/info commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Shared state every handler needs.
pub struct CommandContext {
    pub config: AppConfig,
    pub runtime: IncusCli,
    /// Absolute workspace path for this invocation.
    pub workspace: PathBuf,
}

impl CommandContext {
    fn new(workspace_flag: Option<PathBuf>) -> Result<Self> {
        let config = AppConfig::load()?;

        let workspace = match workspace_flag {
            Some(dir) => dir,
            None => env::current_dir().context("determining current directory")?,
        };
        let workspace =
            std::path::absolute(&workspace).context("resolving workspace path")?;

        let runtime = IncusCli::new().with_timeouts(
            Duration::from_secs(config.timeouts.exec),
            Duration::from_secs(config.timeouts.snapshot),
        );

        Ok(Self {
            config,
            runtime,
            workspace,
        })
    }

    /// Session store for the configured tool.
    pub fn store(&self) -> Result<SessionStore> {
        Ok(SessionStore::new(self.config.sessions_dir()?))
    }

    /// Name prefix of every container this engine owns, across workspaces.
    pub fn global_prefix(&self) -> String {
        format!("{}-", self.config.container.prefix)
    }

    /// Resolve the target container for snapshot/container subcommands:
    /// explicit flag, then `COI_CONTAINER`, then auto-resolution from the
    /// workspace.
    pub async fn resolve_container(
        &self,
        explicit: Option<&str>,
    ) -> crate::error::Result<String> {
        let env_container = env::var(CONTAINER_ENV).ok().filter(|v| !v.is_empty());
        identity::resolve_identity(
            &self.runtime,
            &self.config.container.prefix,
            &self.workspace,
            explicit,
            env_container.as_deref(),
            None,
        )
        .await
    }
}

/// Ask the user to confirm a destructive action. Defaults to no.
pub fn confirm(prompt: &str) -> bool {
    eprint!("{prompt} [y/N]: ");
    let _ = io::stderr().flush();

    let mut response = String::new();
    if io::stdin().lock().read_line(&mut response).is_err() {
        return false;
    }
    let response = response.trim().to_lowercase();
    response == "y" || response == "yes"
}

/// Parse arguments and run the selected command. Returns the process exit
/// code.
pub async fn run(cli: Cli) -> Result<i32> {
    if let Command::Completion { shell } = &cli.command {
        let mut command = <Cli as clap::CommandFactory>::command();
        clap_complete::generate(*shell, &mut command, "coi", &mut io::stdout());
        return Ok(0);
    }

    let ctx = CommandContext::new(cli.workspace)?;

    match cli.command {
        Command::Shell(args) => shell::run(&ctx, args, cli.debug).await,
        Command::Attach(args) => attach::run(&ctx, args).await,
        Command::List(args) => list::run(&ctx, args).await,
        Command::Snapshot { command } => snapshot::run(&ctx, command).await,
        Command::Container { command } => container::run(&ctx, command).await,
        Command::Clean(args) => clean::run(&ctx, args).await,
        Command::Completion { .. } => unreachable!("handled above"),
    }
}

/// Exit code for a failed run: engine errors carry their own code,
/// everything else is 1.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>().map_or(1, Error::exit_code)
}
