//! `overture cache`.

use crate::context::Context;
use crate::output::{self, table::Table};
use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use overture_cache::ClearScope;
use std::process::ExitCode;

/// What `cache clear` removes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Everything
    #[default]
    All,
    /// PHP tarballs and binaries
    Versions,
    /// PECL and extension archives
    Extensions,
    /// Composer phars
    Composer,
    /// Leftover partial downloads
    Downloads,
}

impl From<Scope> for ClearScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::All => Self::All,
            Scope::Versions => Self::Versions,
            Scope::Extensions => Self::Extensions,
            Scope::Composer => Self::Composer,
            Scope::Downloads => Self::Downloads,
        }
    }
}

/// Cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Show cached artifacts per class
    Stats,
    /// Remove cached artifacts
    Clear {
        /// What to remove
        #[arg(value_enum, default_value_t = Scope::All)]
        scope: Scope,
    },
}

/// Run a cache subcommand.
pub fn run(ctx: &Context, cmd: &CacheCommand) -> Result<ExitCode> {
    let cache = ctx.cache()?;
    match cmd {
        CacheCommand::Stats => {
            let stats = cache.stats();
            let mut table = Table::new();
            table.headers(["Class", "Artifacts", "Size"]);
            for (class, class_stats) in &stats.by_class {
                table.row([
                    class.clone(),
                    class_stats.count.to_string(),
                    output::bytes(class_stats.bytes),
                ]);
            }
            table.row([
                "total".to_string(),
                stats.entries.to_string(),
                output::bytes(stats.total_size),
            ]);
            table.print();
            if stats.downloads_size > 0 {
                output::info(&format!(
                    "{} in partial downloads (`overture cache clear downloads`)",
                    output::bytes(stats.downloads_size)
                ));
            }
            output::info(&format!("Location: {}", cache.root().display()));
        }
        CacheCommand::Clear { scope } => {
            let summary = cache.clear((*scope).into())?;
            output::success(&format!(
                "Removed {} artifacts, freed {}",
                summary.removed,
                output::bytes(summary.freed_bytes)
            ));
        }
    }
    Ok(ExitCode::SUCCESS)
}
