//! `overture doctor`.

use crate::context::Context;
use crate::output::{self, table::Table};
use anyhow::Result;
use clap::Args;
use overture_installer::{EnvironmentRepair, ProcessRunner};
use overture_platform::{BuildTool, Platform};
use std::process::ExitCode;
use std::sync::Arc;

/// Arguments for the doctor command.
#[derive(Args, Debug, Clone)]
pub struct DoctorArgs {
    /// Install missing build tools with the system package manager
    #[arg(long)]
    pub fix: bool,
}

/// Run the doctor command.
pub async fn run(ctx: &Context, args: &DoctorArgs) -> Result<ExitCode> {
    let platform = Platform::current();
    let repair = EnvironmentRepair::detect(Arc::new(ProcessRunner), &ctx.paths.logs_dir());

    let mut table = Table::new();
    table.row(["Platform".to_string(), platform.to_string()]);
    table.row([
        "Prebuilt binaries".to_string(),
        if platform.supports_prebuilt() { "supported" } else { "unsupported" }.to_string(),
    ]);
    table.row([
        "Package manager".to_string(),
        repair
            .manager()
            .map_or_else(|| "none found".to_string(), |pm| pm.to_string()),
    ]);
    table.row(["Home".to_string(), ctx.paths.root().display().to_string()]);
    table.print();

    let mut tools = Table::new();
    tools.headers(["Tool", "Status"]);
    for tool in BuildTool::ALL {
        let status = if repair.missing().contains(&tool) {
            tools.error_cell("missing")
        } else {
            tools.success_cell("found")
        };
        tools.styled_row(vec![tools.cell(tool), status]);
    }
    tools.print();

    if repair.missing().is_empty() {
        output::success("All build prerequisites are present");
        return Ok(ExitCode::SUCCESS);
    }

    let planned = repair.planned_packages();
    if !args.fix {
        if planned.is_empty() {
            output::warning("missing build tools; install them manually");
        } else {
            output::warning(&format!(
                "missing build tools; run `overture doctor --fix` to install {}",
                planned.join(" ")
            ));
        }
        return Ok(ExitCode::FAILURE);
    }

    if !ctx.assume_yes
        && !output::confirm(&format!("Install {} now?", planned.join(" ")), false)
    {
        output::warning("aborted");
        return Ok(ExitCode::FAILURE);
    }

    let report = repair.run().await?;
    for command in &report.commands {
        output::info(&format!("ran `{command}`"));
    }
    output::success(&format!("Installed {}", report.packages.join(" ")));
    Ok(ExitCode::SUCCESS)
}
