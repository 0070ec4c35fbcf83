//! `overture uninstall`.

use crate::context::Context;
use crate::output;
use anyhow::Result;
use clap::Args;
use std::process::ExitCode;
use tracing::info;

/// Arguments for the uninstall command.
#[derive(Args, Debug, Clone)]
pub struct UninstallArgs {
    /// Exact versions to remove
    #[arg(required = true, value_name = "VERSION")]
    pub versions: Vec<String>,

    /// Remove even when selected globally or pinned by a project; clears
    /// those pointers
    #[arg(short, long)]
    pub force: bool,
}

/// Run the uninstall command.
pub fn run(ctx: &Context, args: &UninstallArgs) -> Result<ExitCode> {
    info!(versions = ?args.versions, force = args.force, "running uninstall command");
    if args.force
        && !ctx.assume_yes
        && !output::confirm(
            &format!(
                "Force-remove {}? Pointers selecting it will be cleared",
                args.versions.join(", ")
            ),
            true,
        )
    {
        output::warning("aborted");
        return Ok(ExitCode::FAILURE);
    }

    let pipeline = ctx.pipeline()?;
    let results = pipeline.batch_remove(&args.versions, args.force);
    let mut failed = false;
    for (version, result) in &results {
        match result {
            Ok(removal) => {
                output::success(&format!("Removed PHP {version}"));
                for pointer in &removal.cleared {
                    output::info(&format!("cleared {pointer}"));
                }
                if !removal.deleted_files {
                    output::info("install directory left in place");
                }
            }
            Err(e) => {
                failed = true;
                output::error(&format!("{version}: {}", e.display_with_suggestions()));
            }
        }
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
