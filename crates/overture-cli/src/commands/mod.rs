//! CLI commands for Overture.

pub mod cache;
pub mod doctor;
pub mod install;
pub mod list;
pub mod mirror;
pub mod select;
pub mod tools;
pub mod uninstall;

use clap::{Parser, Subcommand};

/// Overture - a PHP version manager
///
/// Installs PHP from source or prebuilt archives through configurable
/// mirrors, verifies every download, and switches between installed
/// runtimes per shell, globally or per project.
#[derive(Parser, Debug)]
#[command(name = "overture")]
#[command(author = "Overture Contributors")]
#[command(version)]
#[command(about = "A PHP version manager with mirror-aware downloads", long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Only print errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    pub no_ansi: bool,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Increase verbosity: -v info, -vv debug, -vvv trace
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install one or more PHP versions
    #[command(alias = "i")]
    Install(install::InstallArgs),

    /// Remove installed PHP versions
    #[command(alias = "rm")]
    Uninstall(uninstall::UninstallArgs),

    /// List installed (or installable) versions
    #[command(alias = "ls")]
    List(list::ListArgs),

    /// Switch the current shell or the global default to a version
    Use(select::UseArgs),

    /// Pin a project directory to a version (.php-version)
    Pin(select::PinArgs),

    /// Remove a project pin
    Unpin(select::UnpinArgs),

    /// Show the version selected for this shell
    Current,

    /// Print the PHP binary in effect for a directory
    Which(select::WhichArgs),

    /// Manage download mirrors
    #[command(subcommand)]
    Mirror(mirror::MirrorCommand),

    /// Inspect or clear the artifact cache
    #[command(subcommand)]
    Cache(cache::CacheCommand),

    /// Build and enable PECL extensions
    #[command(subcommand)]
    Ext(tools::ExtCommand),

    /// Install Composer into a PHP version
    #[command(subcommand)]
    Composer(tools::ComposerCommand),

    /// Check build prerequisites and optionally install missing ones
    Doctor(doctor::DoctorArgs),
}
