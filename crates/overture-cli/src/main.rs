//! Overture CLI - install, select and remove PHP runtimes.
//!
//! Every command maps its outcome to the process exit code: `0` on success,
//! `1` on any failure, with the failure printed to stderr together with
//! suggestions for fixing it.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod context;
mod output;

use clap::Parser;
use commands::{Cli, Commands};
use context::Context;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 if cli.quiet => Level::ERROR,
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    output::init(cli.no_ansi, cli.quiet);

    let ctx = match Context::new(cli.quiet, cli.yes) {
        Ok(ctx) => ctx,
        Err(e) => {
            output::report(&e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            output::error(&format!("failed to start async runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(&cli, &ctx)) {
        Ok(code) => code,
        Err(e) => {
            output::report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: &Cli, ctx: &Context) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Install(args) => commands::install::run(ctx, args).await,
        Commands::Uninstall(args) => commands::uninstall::run(ctx, args),
        Commands::List(args) => commands::list::run(ctx, args).await,
        Commands::Use(args) => commands::select::use_version(ctx, args),
        Commands::Pin(args) => commands::select::pin(ctx, args),
        Commands::Unpin(args) => commands::select::unpin(ctx, args),
        Commands::Current => commands::select::current(ctx),
        Commands::Which(args) => commands::select::which(ctx, args),
        Commands::Mirror(cmd) => commands::mirror::run(ctx, cmd).await,
        Commands::Cache(cmd) => commands::cache::run(ctx, cmd),
        Commands::Ext(cmd) => commands::tools::ext(ctx, cmd).await,
        Commands::Composer(cmd) => commands::tools::composer(ctx, cmd).await,
        Commands::Doctor(args) => commands::doctor::run(ctx, args).await,
    }
}
