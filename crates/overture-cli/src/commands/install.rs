//! `overture install`.

use crate::context::Context;
use crate::output;
use anyhow::Result;
use clap::Args;
use overture_core::Error;
use overture_installer::{InstallOptions, InstallReport, InstallState, StateObserver};
use overture_registry::SwitchScope;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// Arguments for the install command.
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Versions to install (`8.3`, `8.3.4`, `8`)
    #[arg(required = true, value_name = "VERSION")]
    pub versions: Vec<String>,

    #[command(flatten)]
    pub flags: InstallFlags,

    /// Place a prebuilt binary instead of compiling
    #[arg(long)]
    pub prebuilt: bool,

    /// Keep the extracted source tree after building
    #[arg(long)]
    pub keep_source: bool,

    /// Extra flag passed to ./configure (repeatable)
    #[arg(long = "configure-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub configure_flags: Vec<String>,

    /// Switch the current shell to the installed version
    #[arg(long = "use", conflicts_with = "global")]
    pub use_current: bool,

    /// Make the installed version the global default
    #[arg(long)]
    pub global: bool,

    /// Reinstall even when already installed
    #[arg(long)]
    pub reinstall: bool,

    /// Raw install option as key=value (repeatable)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}

/// Download flags shared by every install-like command.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallFlags {
    /// Ignore cached artifacts and download again
    #[arg(long)]
    pub no_cache: bool,

    /// Download segments per artifact
    #[arg(long, value_name = "N")]
    pub threads: Option<u32>,

    /// Download with a single stream
    #[arg(long)]
    pub single_thread: bool,

    /// Skip checksum verification
    #[arg(long)]
    pub no_verify: bool,
}

impl InstallFlags {
    /// Options from settings with these flags applied.
    pub fn options(&self, ctx: &Context) -> InstallOptions {
        let base = InstallOptions::from_settings(&ctx.settings);
        let threads = self.threads.unwrap_or(base.thread_count);
        let multi = base.use_multi_thread && !self.single_thread;
        base.use_cache(!self.no_cache)
            .threading(multi, threads)
            .verify_signature(!self.no_verify)
    }
}

impl InstallArgs {
    fn install_options(&self, ctx: &Context) -> overture_core::Result<InstallOptions> {
        let scope = if self.global {
            Some(SwitchScope::Global)
        } else if self.use_current {
            Some(SwitchScope::Current)
        } else {
            None
        };
        let mut options = self
            .flags
            .options(ctx)
            .from_source(!self.prebuilt)
            .keep_source(self.keep_source)
            .switch_to(scope)
            .reinstall(self.reinstall);
        for flag in &self.configure_flags {
            options = options.configure_flag(flag.clone());
        }
        let pairs = parse_pairs(&self.options)?;
        options.with_pairs(pairs)
    }
}

/// Split `key=value` arguments.
pub fn parse_pairs(raw: &[String]) -> overture_core::Result<Vec<(&str, &str)>> {
    raw.iter()
        .map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim(), v))
                .ok_or_else(|| Error::invalid_option(item.clone(), "expected key=value"))
        })
        .collect()
}

/// Observer printing each pipeline state as it is entered.
pub fn state_printer(label: String) -> StateObserver {
    Arc::new(move |state: &InstallState| match state {
        InstallState::Requested | InstallState::Done | InstallState::Failed(_) => {}
        other => output::info(&format!("{label}: {other}")),
    })
}

/// Run the install command.
pub async fn run(ctx: &Context, args: &InstallArgs) -> Result<ExitCode> {
    info!(versions = ?args.versions, "running install command");
    let options = args.install_options(ctx)?;
    let pipeline = ctx.pipeline()?.with_observer(state_printer("php".to_string()));

    let results = pipeline.batch_install(&args.versions, &options).await;
    let mut failed = 0usize;
    for (spec, result) in &results {
        match result {
            Ok(report) => print_report(spec, report),
            Err(e) => {
                failed += 1;
                output::error(&format!("{spec}: {}", e.display_with_suggestions()));
            }
        }
    }

    if failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        if results.len() > 1 {
            output::warning(&format!("{failed} of {} installs failed", results.len()));
        }
        Ok(ExitCode::FAILURE)
    }
}

fn print_report(spec: &str, report: &InstallReport) {
    if report.already_installed {
        output::success(&format!(
            "PHP {} is already installed at {}",
            report.version,
            report.install_path.display()
        ));
    } else {
        output::success(&format!(
            "Installed PHP {} ({}) from `{spec}` at {}",
            report.version,
            report.source_type,
            report.install_path.display()
        ));
    }
    match (&report.switched, &report.switch_error) {
        (Some(SwitchScope::Global), _) => output::info(&format!("PHP {} is now the global default", report.version)),
        (Some(SwitchScope::Current), _) => output::info(&format!("PHP {} is now current", report.version)),
        (None, Some(reason)) => output::warning(&format!("installed, but switching failed: {reason}")),
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pairs_split_on_first_equals() {
        let raw = vec!["configure_flag=--with-x=y".to_string(), "use=global".to_string()];
        assert_eq!(
            parse_pairs(&raw).unwrap(),
            vec![("configure_flag", "--with-x=y"), ("use", "global")]
        );
    }

    #[test]
    fn pair_without_equals_is_rejected() {
        let raw = vec!["keep_source".to_string()];
        assert!(matches!(
            parse_pairs(&raw).unwrap_err(),
            Error::InvalidOption { .. }
        ));
    }
}
