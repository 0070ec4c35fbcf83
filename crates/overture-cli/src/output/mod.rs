//! Terminal output helpers.
//!
//! Colors follow the terminal: disabled when stdout is not a TTY, when
//! `NO_COLOR` is set, or with `--no-ansi`.

pub mod table;

use owo_colors::OwoColorize;
use std::io::{IsTerminal, stderr, stdout};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

static COLOR_ENABLED: AtomicBool = AtomicBool::new(true);
static QUIET: AtomicBool = AtomicBool::new(false);

static IS_TTY: LazyLock<bool> = LazyLock::new(|| stdout().is_terminal() && stderr().is_terminal());

static NO_COLOR: LazyLock<bool> = LazyLock::new(|| std::env::var_os("NO_COLOR").is_some());

/// Initialize output settings from flags and environment.
pub fn init(no_ansi: bool, quiet: bool) {
    COLOR_ENABLED.store(!no_ansi && *IS_TTY && !*NO_COLOR, Ordering::Relaxed);
    QUIET.store(quiet, Ordering::Relaxed);
}

/// Whether colors are enabled.
pub fn colors_enabled() -> bool {
    COLOR_ENABLED.load(Ordering::Relaxed)
}

/// Whether both stdout and stderr are terminals.
pub fn is_tty() -> bool {
    *IS_TTY
}

fn quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print a success message.
pub fn success(text: &str) {
    if quiet() {
        return;
    }
    if colors_enabled() {
        println!("{} {}", "✓".green(), text);
    } else {
        println!("OK {text}");
    }
}

/// Print an informational line.
pub fn info(text: &str) {
    if quiet() {
        return;
    }
    if colors_enabled() {
        println!("{} {}", "•".cyan(), text);
    } else {
        println!("{text}");
    }
}

/// Print a warning message.
pub fn warning(text: &str) {
    if colors_enabled() {
        eprintln!("{} {}", "!".yellow(), text.yellow());
    } else {
        eprintln!("warning: {text}");
    }
}

/// Print an error message.
pub fn error(text: &str) {
    if colors_enabled() {
        eprintln!("{} {}", "✗".red(), text.red());
    } else {
        eprintln!("error: {text}");
    }
}

/// Print a failure, with suggestions when it is an Overture error.
pub fn report(err: &anyhow::Error) {
    match err.downcast_ref::<overture_core::Error>() {
        Some(core) => error(&core.display_with_suggestions()),
        None => error(&format!("{err:#}")),
    }
}

/// Ask for confirmation; non-interactive sessions get `default`.
pub fn confirm(message: &str, default: bool) -> bool {
    if !(stdout().is_terminal() && std::io::stdin().is_terminal()) {
        return default;
    }
    dialoguer::Confirm::with_theme(&dialoguer::theme::ColorfulTheme::default())
        .with_prompt(message)
        .default(default)
        .interact()
        .unwrap_or(default)
}

/// Human-readable byte count.
pub fn bytes(n: u64) -> String {
    overture_downloader::format_bytes(n)
}
