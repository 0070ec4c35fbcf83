//! Progress bars for artifact downloads.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared progress display; hidden when disabled.
#[derive(Clone)]
pub struct ProgressTracker {
    multi: MultiProgress,
    enabled: bool,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl ProgressTracker {
    /// Create a new progress tracker.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let multi = MultiProgress::new();
        if !enabled {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self { multi, enabled }
    }

    /// Create a disabled progress tracker.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Check if progress display is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start a bar for one download attempt.
    #[must_use]
    pub fn start(&self, name: &str) -> DownloadProgress {
        let bar = if self.enabled {
            let style = ProgressStyle::default_bar()
                .template("  {spinner:.dim} {msg:<30} [{bar:25.green/dim}] {bytes:>10}/{total_bytes:<10} {bytes_per_sec:>12}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━╸─");
            let pb = self.multi.add(ProgressBar::new(0));
            pb.set_style(style);
            pb.set_message(truncate_name(name, 30));
            Some(pb)
        } else {
            None
        };
        DownloadProgress {
            bar,
            bytes: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Progress handle shared by the segments of one download.
#[derive(Clone)]
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
    bytes: Arc<AtomicU64>,
}

impl std::fmt::Debug for DownloadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadProgress")
            .field("bytes", &self.bytes())
            .field("has_bar", &self.bar.is_some())
            .finish()
    }
}

impl DownloadProgress {
    /// A handle that only counts bytes.
    #[must_use]
    pub fn hidden() -> Self {
        ProgressTracker::disabled().start("")
    }

    /// Set the expected size.
    pub fn set_total(&self, total: u64) {
        if let Some(ref pb) = self.bar {
            pb.set_length(total);
        }
    }

    /// Record `n` more bytes.
    pub fn inc(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
        if let Some(ref pb) = self.bar {
            pb.inc(n);
        }
    }

    /// Discard bytes counted by a failed attempt.
    pub fn rewind(&self, n: u64) {
        let _ = self
            .bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                Some(b.saturating_sub(n))
            });
        if let Some(ref pb) = self.bar {
            pb.set_position(pb.position().saturating_sub(n));
        }
    }

    /// Bytes recorded so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Clear the bar after success.
    pub fn finish(&self) {
        if let Some(ref pb) = self.bar {
            pb.finish_and_clear();
        }
    }

    /// Leave the bar marked as failed.
    pub fn abandon(&self) {
        if let Some(ref pb) = self.bar {
            pb.abandon_with_message(console::style("failed").red().to_string());
        }
    }
}

/// Format bytes as human-readable string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let head: String = name.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_test() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn truncate_name_test() {
        assert_eq!(truncate_name("short", 10), "short");
        assert_eq!(truncate_name("php-8.3.4.tar.gz", 10), "php-8.3...");
    }

    #[test]
    fn hidden_progress_counts_bytes() {
        let progress = DownloadProgress::hidden();
        progress.inc(10);
        progress.inc(5);
        progress.rewind(7);
        assert_eq!(progress.bytes(), 8);
    }
}
