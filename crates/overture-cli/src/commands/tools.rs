//! `overture ext` and `overture composer`.

use super::install::{InstallFlags, state_printer};
use super::select::installed_version;
use crate::context::Context;
use crate::output;
use anyhow::Result;
use clap::Subcommand;
use overture_core::Error;
use overture_installer::ToolReport;
use std::process::ExitCode;

/// Extension subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ExtCommand {
    /// Build a PECL extension and enable it
    Install {
        /// Extension name (e.g. redis, xdebug)
        name: String,

        /// Extension version
        #[arg(id = "version_spec", value_name = "VERSION", default_value = "latest")]
        version: String,

        /// PHP version to build against (defaults to the selected one)
        #[arg(long, value_name = "VERSION")]
        php: Option<String>,

        /// Keep the extracted source tree
        #[arg(long)]
        keep_source: bool,

        #[command(flatten)]
        flags: InstallFlags,
    },
}

/// Composer subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ComposerCommand {
    /// Place composer.phar into a PHP version's bin directory
    Install {
        /// Composer version
        #[arg(id = "version_spec", value_name = "VERSION", default_value = "latest")]
        version: String,

        /// PHP version to install into (defaults to the selected one)
        #[arg(long, value_name = "VERSION")]
        php: Option<String>,

        #[command(flatten)]
        flags: InstallFlags,
    },
}

/// Installed PHP named by `--php`, or the selected one.
fn target_php(ctx: &Context, php: Option<&str>) -> overture_core::Result<String> {
    let registry = ctx.registry()?;
    match php {
        Some(spec) => installed_version(&registry, spec),
        None => registry
            .current()
            .or_else(|| registry.global())
            .ok_or_else(|| {
                Error::invalid_option("php", "no PHP version selected; pass --php or run `overture use`")
            }),
    }
}

fn print_report(report: &ToolReport) {
    output::success(&format!(
        "Installed {} {} for PHP {} ({})",
        report.target,
        report.version,
        report.php,
        report.path.display()
    ));
}

/// Run an ext subcommand.
pub async fn ext(ctx: &Context, cmd: &ExtCommand) -> Result<ExitCode> {
    let ExtCommand::Install {
        name,
        version,
        php,
        keep_source,
        flags,
    } = cmd;
    let php = target_php(ctx, php.as_deref())?;
    let options = flags.options(ctx).keep_source(*keep_source);
    let pipeline = ctx.pipeline()?.with_observer(state_printer(format!("ext-{name}")));
    let report = pipeline.install_extension(name, version, &php, &options).await?;
    print_report(&report);
    Ok(ExitCode::SUCCESS)
}

/// Run a composer subcommand.
pub async fn composer(ctx: &Context, cmd: &ComposerCommand) -> Result<ExitCode> {
    let ComposerCommand::Install { version, php, flags } = cmd;
    let php = target_php(ctx, php.as_deref())?;
    let options = flags.options(ctx);
    let pipeline = ctx.pipeline()?.with_observer(state_printer("composer".to_string()));
    let report = pipeline.install_composer(version, &php, &options).await?;
    print_report(&report);
    Ok(ExitCode::SUCCESS)
}
