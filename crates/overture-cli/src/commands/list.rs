//! `overture list`.

use crate::context::Context;
use crate::output::{self, table::Table};
use anyhow::Result;
use clap::Args;
use overture_core::{ResourceClass, VersionSpec};
use overture_registry::VersionStatus;
use std::process::ExitCode;

/// Arguments for the list command.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// List installable releases instead of installed ones
    #[arg(short, long)]
    pub available: bool,

    /// Resource class for --available (php, composer, pecl, ext:<name>)
    #[arg(long, default_value = "php", requires = "available")]
    pub class: ResourceClass,

    /// Only show releases matching this version prefix
    #[arg(value_name = "FILTER")]
    pub filter: Option<String>,
}

/// Run the list command.
pub async fn run(ctx: &Context, args: &ListArgs) -> Result<ExitCode> {
    let filter = args.filter.as_deref().map(VersionSpec::parse).transpose()?;
    if args.available {
        list_available(ctx, &args.class, filter.as_ref()).await
    } else {
        list_installed(ctx, filter.as_ref())
    }
}

fn list_installed(ctx: &Context, filter: Option<&VersionSpec>) -> Result<ExitCode> {
    let registry = ctx.registry()?;
    let current = registry.current();
    let global = registry.global();
    let installed: Vec<_> = registry
        .list()
        .into_iter()
        .filter(|v| filter.is_none_or(|f| f.matches(&v.version)))
        .collect();

    if installed.is_empty() {
        output::info("No PHP versions installed. Try `overture install 8.3`.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table.headers(["", "Version", "Status", "Source", "Path"]);
    for entry in &installed {
        let version = entry.version.to_string();
        let mut marks = String::new();
        if current.as_deref() == Some(version.as_str()) {
            marks.push('*');
        }
        if global.as_deref() == Some(version.as_str()) {
            marks.push('g');
        }
        let status = match entry.status {
            VersionStatus::Active => table.success_cell(entry.status),
            VersionStatus::Installed => table.cell(entry.status),
            VersionStatus::Incomplete => table.warning_cell(entry.status),
        };
        table.styled_row(vec![
            table.cell(marks),
            table.cell(&version),
            status,
            table.cell(entry.source_type),
            table.dim_cell(entry.install_path.display()),
        ]);
    }
    table.print();
    Ok(ExitCode::SUCCESS)
}

async fn list_available(
    ctx: &Context,
    class: &ResourceClass,
    filter: Option<&VersionSpec>,
) -> Result<ExitCode> {
    let pipeline = ctx.pipeline()?;
    let registry = ctx.registry()?;
    let mut versions = pipeline.available(class).await?;
    versions.retain(|v| filter.is_none_or(|f| f.matches(v)));
    versions.reverse();

    if versions.is_empty() {
        output::warning(&format!("no {class} releases found"));
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table.headers(["Version", "Installed"]);
    for version in &versions {
        let installed = matches!(class, ResourceClass::Php) && registry.is_installed(&version.to_string());
        table.styled_row(vec![
            table.cell(version),
            if installed {
                table.success_cell("yes")
            } else {
                table.dim_cell("")
            },
        ]);
    }
    table.print();
    Ok(ExitCode::SUCCESS)
}
