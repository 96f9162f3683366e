//! `mcarch`: keeps the mod archive's object stores and content network in
//! line with its metadata repository.

mod cli;
mod commands;
mod error;
mod output;
mod stores;

use crate::cli::Cli;
use crate::commands::Context;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use mcarch_config::Config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    // Logs go to stderr so that `--json` output on stdout stays clean.
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::from(2)
        },
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(metadata) = cli.metadata {
        config.metadata = metadata;
    }
    config.dry_run |= cli.dry_run;

    let mut ctx = Context::from_config(&config).await?;
    ctx.json = cli.json;
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing actions already in flight");
            cancel.cancel();
        }
    });
    commands::run(&ctx, cli.command).await
}
