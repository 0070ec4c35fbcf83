//! `overture mirror`.

use crate::context::Context;
use crate::output::{self, table::Table};
use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use overture_core::ResourceClass;
use overture_mirror::{CacheState, HttpProbe, MirrorRegistry, MirrorSpeedRanker};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// On/off switch.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Enable.
    On,
    /// Disable.
    Off,
}

impl Toggle {
    const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Mirror subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum MirrorCommand {
    /// Show configured mirrors
    List {
        /// Only this class (php, pecl, composer, ext:<name>)
        class: Option<ResourceClass>,
    },
    /// Set the primary mirror for a class
    Set {
        /// Resource class
        class: ResourceClass,
        /// Mirror base URL
        url: String,
    },
    /// Append a fallback mirror for a class
    Add {
        /// Resource class
        class: ResourceClass,
        /// Mirror base URL
        url: String,
    },
    /// Remove a fallback mirror from a class
    Remove {
        /// Resource class
        class: ResourceClass,
        /// Mirror base URL
        url: String,
    },
    /// Forget every mirror of a class, or of all classes
    Reset {
        /// Resource class; all when omitted
        class: Option<ResourceClass>,
    },
    /// Route downloads through mirrors
    Enable,
    /// Download only from official upstreams
    Disable,
    /// Set the per-request timeout in seconds
    Timeout {
        /// Seconds
        secs: u64,
    },
    /// Toggle TLS certificate verification
    Ssl {
        /// on or off
        state: Toggle,
    },
    /// Toggle falling back to the official upstream
    AutoFallback {
        /// on or off
        state: Toggle,
    },
    /// Probe the mirrors of a class and store the ranking
    SpeedTest {
        /// Resource class
        #[arg(default_value = "php")]
        class: ResourceClass,
    },
    /// Show global settings and the ranking cache
    Status,
    /// Delete the cached ranking
    ClearCache,
}

const DEFAULT_CLASSES: [ResourceClass; 3] =
    [ResourceClass::Php, ResourceClass::Pecl, ResourceClass::Composer];

/// Run a mirror subcommand.
pub async fn run(ctx: &Context, cmd: &MirrorCommand) -> Result<ExitCode> {
    let mut mirrors = ctx.mirrors()?;
    match cmd {
        MirrorCommand::List { class } => list(&mirrors, class.as_ref()),
        MirrorCommand::Set { class, url } => {
            mirrors.set_primary(class, url)?;
            mirrors.save()?;
            output::success(&format!("{url} is now the primary {class} mirror"));
        }
        MirrorCommand::Add { class, url } => {
            mirrors.add_fallback(class, url)?;
            mirrors.save()?;
            output::success(&format!("Added {url} as a {class} fallback"));
        }
        MirrorCommand::Remove { class, url } => {
            mirrors.remove_fallback(class, url)?;
            mirrors.save()?;
            output::success(&format!("Removed {url} from {class}"));
        }
        MirrorCommand::Reset { class } => {
            match class {
                Some(class) => mirrors.reset(class),
                None => mirrors.reset_all(),
            }
            mirrors.save()?;
            output::success("Mirror configuration reset");
        }
        MirrorCommand::Enable => {
            mirrors.enable();
            mirrors.save()?;
            output::success("Mirrors enabled");
        }
        MirrorCommand::Disable => {
            mirrors.disable();
            mirrors.save()?;
            output::success("Mirrors disabled; downloads use official upstreams");
        }
        MirrorCommand::Timeout { secs } => {
            mirrors.set_timeout(*secs)?;
            mirrors.save()?;
            output::success(&format!("Mirror timeout set to {secs}s"));
        }
        MirrorCommand::Ssl { state } => {
            mirrors.set_verify_ssl(state.enabled());
            mirrors.save()?;
            if !state.enabled() {
                output::warning("TLS certificate verification disabled");
            }
            output::success(&format!("SSL verification {}", on_off(state.enabled())));
        }
        MirrorCommand::AutoFallback { state } => {
            mirrors.set_auto_fallback(state.enabled());
            mirrors.save()?;
            output::success(&format!("Automatic fallback {}", on_off(state.enabled())));
        }
        MirrorCommand::SpeedTest { class } => speed_test(ctx, &mirrors, class).await?,
        MirrorCommand::Status => status(ctx, &mirrors)?,
        MirrorCommand::ClearCache => {
            ranker(ctx, &mirrors)?.clear_cache()?;
            output::success("Speed-test cache cleared");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn list(mirrors: &MirrorRegistry, only: Option<&ResourceClass>) {
    let mut classes: Vec<ResourceClass> = match only {
        Some(class) => vec![class.clone()],
        None => DEFAULT_CLASSES.to_vec(),
    };
    if only.is_none() {
        for class in mirrors.configured_classes() {
            if !classes.contains(&class) {
                classes.push(class);
            }
        }
    }

    let mut table = Table::new();
    table.headers(["Class", "Role", "Name", "URL"]);
    for class in &classes {
        for entry in mirrors.list_mirrors(class) {
            let role = match (entry.is_primary, entry.is_official) {
                (true, true) => "primary (official)",
                (true, false) => "primary",
                (false, true) => "official fallback",
                (false, false) => "fallback",
            };
            table.styled_row(vec![
                table.cell(class),
                if entry.is_primary {
                    table.success_cell(role)
                } else {
                    table.cell(role)
                },
                table.cell(&entry.name),
                table.dim_cell(&entry.url),
            ]);
        }
    }
    table.print();
    if !mirrors.is_enabled() {
        output::warning("mirrors are disabled; only official upstreams are used");
    }
}

fn ranker(ctx: &Context, mirrors: &MirrorRegistry) -> overture_core::Result<MirrorSpeedRanker> {
    let speed = &ctx.settings.speed_test;
    let probe = Arc::new(HttpProbe::new(mirrors.settings().verify_ssl)?);
    Ok(
        MirrorSpeedRanker::new(probe, ctx.paths.speed_test_cache(), speed.ttl_secs)
            .with_timeout(Duration::from_secs(speed.timeout_secs))
            .with_concurrency(speed.concurrency),
    )
}

async fn speed_test(ctx: &Context, mirrors: &MirrorRegistry, class: &ResourceClass) -> Result<()> {
    let urls = mirrors.all_urls(class);
    output::info(&format!("Probing {} {class} mirrors", urls.len()));
    let results = ranker(ctx, mirrors)?.rank(&urls).await?;

    let mut table = Table::new();
    table.headers(["#", "URL", "Status", "Time"]);
    for (rank, result) in results.iter().enumerate() {
        let (status, time) = match result.response_time_ms {
            Some(ms) if result.is_online() => (table.success_cell("online"), format!("{ms} ms")),
            _ => (table.error_cell("offline"), "-".to_string()),
        };
        table.styled_row(vec![
            table.cell(rank + 1),
            table.cell(&result.url),
            status,
            table.cell(time),
        ]);
    }
    table.print();
    Ok(())
}

fn status(ctx: &Context, mirrors: &MirrorRegistry) -> Result<()> {
    let settings = mirrors.settings();
    let mut table = Table::new();
    table.row(["Mirrors", on_off(settings.enabled)]);
    table.row(["Timeout", format!("{}s", settings.timeout_secs).as_str()]);
    table.row(["SSL verification", on_off(settings.verify_ssl)]);
    table.row(["Auto fallback", on_off(settings.auto_fallback)]);

    let ranker = ranker(ctx, mirrors)?;
    let cache = match (ranker.state(), ranker.cached()) {
        (CacheState::Missing, _) | (_, None) => "none".to_string(),
        (state, Some(cached)) => format!(
            "{}, {} results, expires {}",
            if state == CacheState::Valid { "valid" } else { "expired" },
            cached.results.len(),
            cached.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
        ),
    };
    table.row(["Speed-test cache", cache.as_str()]);
    table.print();
    Ok(())
}
