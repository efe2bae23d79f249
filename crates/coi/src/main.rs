//! coi - isolated, resumable AI coding sessions in Incus containers.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;

use coi::cli::{self, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            let code = cli::exit_code_for(&err);
            let _ = writeln!(io::stderr(), "Error: {err:#}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

#[tokio::main]
async fn run(cli: Cli) -> anyhow::Result<i32> {
    cli::run(cli).await
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
