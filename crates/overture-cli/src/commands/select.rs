//! Version selection: `use`, `pin`, `unpin`, `current`, `which`.

use crate::context::Context;
use crate::output;
use anyhow::Result;
use clap::Args;
use overture_core::{Error, VersionSpec};
use overture_registry::{Selection, SwitchScope, VersionRegistry};
use std::path::PathBuf;
use std::process::ExitCode;

/// Arguments for the use command.
#[derive(Args, Debug, Clone)]
pub struct UseArgs {
    /// Installed version (`8.3` picks the newest installed 8.3.x)
    #[arg(id = "version_spec", value_name = "VERSION")]
    pub version: String,

    /// Change the global default instead of the current shell
    #[arg(short, long)]
    pub global: bool,
}

/// Arguments for the pin command.
#[derive(Args, Debug, Clone)]
pub struct PinArgs {
    /// Installed version
    #[arg(id = "version_spec", value_name = "VERSION")]
    pub version: String,

    /// Project directory (defaults to the working directory)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// Arguments for the unpin command.
#[derive(Args, Debug, Clone)]
pub struct UnpinArgs {
    /// Project directory (defaults to the working directory)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// Arguments for the which command.
#[derive(Args, Debug, Clone)]
pub struct WhichArgs {
    /// Directory to resolve for (defaults to the working directory)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// Newest installed version matching `spec`.
pub(crate) fn installed_version(registry: &VersionRegistry, spec: &str) -> overture_core::Result<String> {
    match VersionSpec::parse(spec)? {
        VersionSpec::Exact(version) => Ok(version.to_string()),
        other => other
            .resolve(&registry.installed_versions())
            .map(|v| v.to_string())
            .ok_or_else(|| Error::VersionNotInstalled {
                version: spec.to_string(),
            }),
    }
}

/// Run the use command.
pub fn use_version(ctx: &Context, args: &UseArgs) -> Result<ExitCode> {
    let mut registry = ctx.registry()?;
    let version = installed_version(&registry, &args.version)?;
    let scope = if args.global {
        SwitchScope::Global
    } else {
        SwitchScope::Current
    };
    let entry = registry.switch(&version, scope)?;
    let target = if args.global { "global default" } else { "current" };
    output::success(&format!(
        "PHP {} is now the {target} ({})",
        entry.version,
        entry.php_binary().display()
    ));
    Ok(ExitCode::SUCCESS)
}

/// Run the pin command.
pub fn pin(ctx: &Context, args: &PinArgs) -> Result<ExitCode> {
    let dir = ctx.dir_or_cwd(args.dir.as_ref())?;
    let mut registry = ctx.registry()?;
    let version = installed_version(&registry, &args.version)?;
    let file = registry.pin(&version, &dir)?;
    output::success(&format!("Pinned PHP {version} in {}", file.display()));
    Ok(ExitCode::SUCCESS)
}

/// Run the unpin command.
pub fn unpin(ctx: &Context, args: &UnpinArgs) -> Result<ExitCode> {
    let dir = ctx.dir_or_cwd(args.dir.as_ref())?;
    let mut registry = ctx.registry()?;
    match registry.unpin(&dir)? {
        Some(version) => {
            output::success(&format!("Removed pin on PHP {version} from {}", dir.display()));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            output::warning(&format!("{} has no .php-version pin", dir.display()));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Run the current command.
pub fn current(ctx: &Context) -> Result<ExitCode> {
    let registry = ctx.registry()?;
    match registry.current().or_else(|| registry.global()) {
        Some(version) => {
            println!("{version}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            output::warning("no PHP version selected; run `overture use <version>`");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Run the which command.
pub fn which(ctx: &Context, args: &WhichArgs) -> Result<ExitCode> {
    let dir = ctx.dir_or_cwd(args.dir.as_ref())?;
    let registry = ctx.registry()?;
    let Some(resolved) = registry.resolve_for_dir(&dir) else {
        output::warning(&format!("no PHP version selected for {}", dir.display()));
        return Ok(ExitCode::FAILURE);
    };
    let entry = registry
        .get(&resolved.version)
        .ok_or_else(|| Error::VersionNotInstalled {
            version: resolved.version.clone(),
        })?;
    println!("{}", entry.php_binary().display());
    if let Selection::Project(at) = &resolved.origin {
        tracing::debug!(pin = %at.display(), "selected by project pin");
    }
    Ok(ExitCode::SUCCESS)
}
